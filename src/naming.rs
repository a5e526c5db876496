//! Metric naming.
//!
//! Every sample name is derived from the escaped disk name plus a status bit
//! or attribute ID. Two layouts are supported; the layout decides both the
//! sample names and the graph keys of the schema, so they always agree.
//!
//! | metric            | per-device                                   | per-metric-kind                        |
//! |-------------------|----------------------------------------------|----------------------------------------|
//! | status bit        | `smart.status.<disk>.<bit>`                  | `smart.status.<disk>--<bit>`           |
//! | status aggregate  | `smart.status.<disk>.all`                    | `smart.status.<disk>--all`             |
//! | normalized        | `smart.attributes.normalized.<disk>.<id>`    | `smart.attributes.normalized.<disk>--<id>` |
//! | raw               | `smart.attributes.raw.<disk>.<id>.value`     | `smart.attributes.raw.<id>.<disk>`     |

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

pub const STATUS_PREFIX: &str = "smart.status";
pub const NORMALIZED_PREFIX: &str = "smart.attributes.normalized";
pub const RAW_PREFIX: &str = "smart.attributes.raw";

/// Separator between disk and metric in the per-metric-kind layout.
pub const MEMBER_SEPARATOR: &str = "--";

/// Replace every character outside `[-a-zA-Z0-9_]` with `_`.
///
/// The agent only accepts these characters in a metric name component.
pub fn escape(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Shape of the graph schema and of the sample names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaLayout {
    /// One graph per metric kind with a `#` wildcard standing for the disk.
    #[default]
    PerDevice,
    /// One graph per metric kind with one member per disk.
    PerMetricKind,
}

impl FromStr for SchemaLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "per-device" | "per_device" | "wildcard" => Ok(SchemaLayout::PerDevice),
            "per-metric-kind" | "per_metric_kind" | "per-kind" => Ok(SchemaLayout::PerMetricKind),
            other => Err(format!(
                "unknown layout {:?} (expected \"per-device\" or \"per-metric-kind\")",
                other
            )),
        }
    }
}

impl fmt::Display for SchemaLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaLayout::PerDevice => write!(f, "per-device"),
            SchemaLayout::PerMetricKind => write!(f, "per-metric-kind"),
        }
    }
}

/// A status metric: the masked aggregate or a single bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusMetric {
    All,
    Bit(u8),
}

impl fmt::Display for StatusMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMetric::All => write!(f, "all"),
            StatusMetric::Bit(bit) => write!(f, "{}", bit),
        }
    }
}

/// Builds sample names and graph keys for a layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricNamer {
    layout: SchemaLayout,
}

impl MetricNamer {
    /// Create a namer for `layout`.
    pub fn new(layout: SchemaLayout) -> Self {
        Self { layout }
    }

    /// The layout names are built for.
    pub fn layout(&self) -> SchemaLayout {
        self.layout
    }

    /// Sample name of a status metric.
    pub fn status(&self, disk: &str, metric: StatusMetric) -> String {
        let disk = escape(disk);
        match self.layout {
            SchemaLayout::PerDevice => format!("{}.{}.{}", STATUS_PREFIX, disk, metric),
            SchemaLayout::PerMetricKind => {
                format!("{}.{}{}{}", STATUS_PREFIX, disk, MEMBER_SEPARATOR, metric)
            }
        }
    }

    /// Sample name of a normalized attribute reading.
    pub fn normalized(&self, disk: &str, id: u8) -> String {
        let disk = escape(disk);
        match self.layout {
            SchemaLayout::PerDevice => format!("{}.{}.{}", NORMALIZED_PREFIX, disk, id),
            SchemaLayout::PerMetricKind => {
                format!("{}.{}{}{}", NORMALIZED_PREFIX, disk, MEMBER_SEPARATOR, id)
            }
        }
    }

    /// Sample name of a raw attribute reading.
    pub fn raw(&self, disk: &str, id: u8) -> String {
        let disk = escape(disk);
        match self.layout {
            SchemaLayout::PerDevice => format!("{}.{}.{}.value", RAW_PREFIX, disk, id),
            SchemaLayout::PerMetricKind => format!("{}.{}.{}", RAW_PREFIX, id, disk),
        }
    }

    /// Graph key of the status graph.
    pub fn status_graph(&self) -> String {
        match self.layout {
            SchemaLayout::PerDevice => format!("{}.#", STATUS_PREFIX),
            SchemaLayout::PerMetricKind => STATUS_PREFIX.to_string(),
        }
    }

    /// Graph key of the normalized attributes graph.
    pub fn normalized_graph(&self) -> String {
        match self.layout {
            SchemaLayout::PerDevice => format!("{}.#", NORMALIZED_PREFIX),
            SchemaLayout::PerMetricKind => NORMALIZED_PREFIX.to_string(),
        }
    }

    /// Graph key of the graph for one raw attribute.
    pub fn raw_graph(&self, id: u8) -> String {
        match self.layout {
            SchemaLayout::PerDevice => format!("{}.#.{}", RAW_PREFIX, id),
            SchemaLayout::PerMetricKind => format!("{}.{}", RAW_PREFIX, id),
        }
    }

    /// Member name for a per-metric-kind graph: `<disk>--<suffix>`.
    pub fn member(&self, disk: &str, suffix: impl fmt::Display) -> String {
        format!("{}{}{}", escape(disk), MEMBER_SEPARATOR, suffix)
    }

    /// Every sample name a configuration can produce, in emission order.
    pub fn all_names<'a>(
        &self,
        disks: impl IntoIterator<Item = &'a str>,
        status_bits: &[u8],
        normalized: &[u8],
        raw: &[u8],
    ) -> Vec<String> {
        let mut names = Vec::new();
        for disk in disks {
            names.push(self.status(disk, StatusMetric::All));
            names.extend(status_bits.iter().map(|&b| self.status(disk, StatusMetric::Bit(b))));
            names.extend(normalized.iter().map(|&id| self.normalized(disk, id)));
            names.extend(raw.iter().map(|&id| self.raw(disk, id)));
        }
        names
    }
}

/// Fail if two disk names escape to the same text.
///
/// Distinct disks sharing an escaped name would report into the same
/// metrics and overwrite each other's cache file.
pub fn check_disk_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<(), ConfigError> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for name in names {
        let escaped = escape(name);
        if escaped.is_empty() {
            return Err(ConfigError::Collision(format!(
                "disk name {:?} is empty after escaping",
                name
            )));
        }
        if let Some(previous) = seen.insert(escaped.clone(), name) {
            return Err(ConfigError::Collision(format!(
                "disks {:?} and {:?} both escape to {:?}",
                previous, name, escaped
            )));
        }
    }
    Ok(())
}

/// Fail if any generated sample name occurs twice.
pub fn check_metric_names(names: &[String]) -> Result<(), ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(ConfigError::Collision(format!(
                "metric {:?} would be reported more than once",
                name
            )));
        }
    }
    Ok(())
}
