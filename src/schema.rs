//! Graph schema generation.
//!
//! The schema is printed once, when the agent asks for plugin meta data.
//! Attribute labels (`5` -> `Reallocated_Sector_Ct`) are learned by probing
//! every disk once, ignoring throttling and `nocheck`; a disk that cannot be
//! probed only costs its labels.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io::Write;

use serde::Serialize;
use smart_metrics_types::{GraphSchema, Unit, PLUGIN_META_MARKER};
use tracing::{debug, error, info, info_span, warn};

use crate::config::PluginConfig;
use crate::error::RunError;
use crate::naming::{escape, SchemaLayout, StatusMetric};
use crate::parser::AttributeParser;
use crate::probe::{DiagnosticProbe, ProbeMode};
use crate::status::bit_meaning;

/// Label used when no disk reported a name for an attribute ID.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Attribute names keyed by attribute ID.
pub type AttributeLabels = BTreeMap<u8, String>;

/// Builds and prints the graph schema for a configuration.
#[derive(Debug, Clone, Copy)]
pub struct SchemaEmitter<'a> {
    config: &'a PluginConfig,
}

impl<'a> SchemaEmitter<'a> {
    /// Create an emitter for `config`.
    pub fn new(config: &'a PluginConfig) -> Self {
        Self { config }
    }

    /// Probe every disk to learn attribute names.
    ///
    /// Skipped entirely when no attributes are configured. When disks
    /// disagree on a name, the first disk (in config order) wins.
    pub fn discover_labels<P: DiagnosticProbe>(&self, probe: &P) -> AttributeLabels {
        let mut labels = AttributeLabels::new();
        if !self.config.wants_attributes() {
            return labels;
        }

        let parser = AttributeParser::new(self.config.metrics.column_check);
        for disk in &self.config.disks {
            let _span = info_span!("disk", name = %disk.name).entered();

            let output = match probe.probe(disk, ProbeMode::Discovery) {
                Ok(output) => output,
                Err(e) => {
                    warn!("Skipping label discovery: {}", e);
                    continue;
                }
            };
            if output.status.is_fatal() {
                error!(
                    "smartctl did not parse its command line (exit status {})",
                    output.status.raw()
                );
                continue;
            }
            if output.status.is_open_failure() {
                info!(
                    "Failed to open device {} in path {}. Maybe sleeping, or you don't have the required privilege.",
                    disk.name, disk.path
                );
                continue;
            }

            match parser.parse(&output.stdout) {
                Ok(table) => {
                    for record in &table.records {
                        if let (Some(id), Some(name)) = (record.id(), record.name()) {
                            labels.entry(id).or_insert_with(|| name.to_string());
                        }
                    }
                }
                Err(e) => warn!("Skipping label discovery: {}", e),
            }
        }

        labels
    }

    /// Build the schema from discovered labels.
    pub fn build(&self, labels: &AttributeLabels) -> GraphSchema {
        match self.config.metrics.schema_layout {
            SchemaLayout::PerDevice => self.build_per_device(labels),
            SchemaLayout::PerMetricKind => self.build_per_metric_kind(labels),
        }
    }

    fn build_per_device(&self, labels: &AttributeLabels) -> GraphSchema {
        let metrics = &self.config.metrics;
        let namer = self.config.namer();

        let mut builder = GraphSchema::builder().graph(namer.status_graph(), |g| {
            let g = g.label("SMART - Status").unit(Unit::Integer).metric("all", "all");
            metrics.status_bits.iter().fold(g, |g, &bit| {
                g.metric(bit.to_string(), format!("{}:{}", bit, bit_meaning(bit)))
            })
        });

        if !metrics.normalized_attributes.is_empty() {
            builder = builder.graph(namer.normalized_graph(), |g| {
                let g = g.label("SMART - Normalized Attributes").unit(Unit::Integer);
                metrics.normalized_attributes.iter().fold(g, |g, &id| {
                    g.metric(id.to_string(), format!("{}:{}", id, label_of(labels, id)))
                })
            });
        }

        for &id in &metrics.raw_attributes {
            builder = builder.graph(namer.raw_graph(id), |g| {
                g.label(format!("SMART - Raw Attribute {:03}: {}", id, label_of(labels, id)))
                    .unit(Unit::Integer)
                    .metric("value", label_of(labels, id))
            });
        }

        builder.build()
    }

    fn build_per_metric_kind(&self, labels: &AttributeLabels) -> GraphSchema {
        let metrics = &self.config.metrics;
        let disks = &self.config.disks;
        let namer = self.config.namer();

        let mut builder = GraphSchema::builder().graph(namer.status_graph(), |g| {
            let g = g.label("SMART - Status").unit(Unit::Integer);
            disks.iter().fold(g, |g, disk| {
                let g = g.metric(
                    namer.member(&disk.name, StatusMetric::All),
                    format!("{}: all", disk.name),
                );
                metrics.status_bits.iter().fold(g, |g, &bit| {
                    g.metric(
                        namer.member(&disk.name, StatusMetric::Bit(bit)),
                        format!("{}: {}:{}", disk.name, bit, bit_meaning(bit)),
                    )
                })
            })
        });

        if !metrics.normalized_attributes.is_empty() {
            builder = builder.graph(namer.normalized_graph(), |g| {
                let g = g.label("SMART - Normalized Attributes").unit(Unit::Integer);
                disks.iter().fold(g, |g, disk| {
                    metrics.normalized_attributes.iter().fold(g, |g, &id| {
                        g.metric(
                            namer.member(&disk.name, id),
                            format!("{}: {}:{}", disk.name, id, label_of(labels, id)),
                        )
                    })
                })
            });
        }

        for &id in &metrics.raw_attributes {
            builder = builder.graph(namer.raw_graph(id), |g| {
                let g = g
                    .label(format!("SMART - Raw Attribute {:03}: {}", id, label_of(labels, id)))
                    .unit(Unit::Integer);
                disks
                    .iter()
                    .fold(g, |g, disk| g.metric(escape(&disk.name), disk.name.clone()))
            });
        }

        builder.build()
    }

    /// Discover labels, build the schema, and print it after the marker line.
    pub fn emit<P: DiagnosticProbe, W: Write>(&self, probe: &P, out: &mut W) -> Result<(), RunError> {
        debug!("print_graph_schema");
        let labels = self.discover_labels(probe);
        let schema = self.build(&labels);
        write_schema(out, &schema)
    }
}

/// Whether to print the schema instead of samples.
///
/// `meta_env` is the value of [`PLUGIN_META_ENV`](smart_metrics_types::PLUGIN_META_ENV),
/// which the agent sets to a non-empty value when it wants meta data.
pub fn wants_schema(flag: bool, meta_env: Option<&OsStr>) -> bool {
    flag || meta_env.is_some_and(|v| !v.is_empty())
}

fn label_of(labels: &AttributeLabels, id: u8) -> &str {
    labels.get(&id).map(String::as_str).unwrap_or(UNKNOWN_LABEL)
}

/// Print the marker line and the schema as JSON indented by four spaces.
pub fn write_schema<W: Write>(out: &mut W, schema: &GraphSchema) -> Result<(), RunError> {
    let mut json = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut json, formatter);
    schema.serialize(&mut serializer)?;

    writeln!(out, "{}", PLUGIN_META_MARKER)?;
    out.write_all(&json)?;
    writeln!(out)?;

    for line in String::from_utf8_lossy(&json).lines() {
        debug!("{}", line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiskConfig, MetricsConfig};
    use crate::error::ProbeError;
    use crate::probe::ProbeOutput;
    use std::cell::RefCell;

    const SAMPLE: &str = include_str!("../tests/fixtures/smartctl-a.txt");

    fn config(layout: SchemaLayout) -> PluginConfig {
        PluginConfig {
            disks: vec![DiskConfig::new("sda", "/dev/sda"), DiskConfig::new("sdb", "/dev/sdb")],
            metrics: MetricsConfig {
                normalized_attributes: vec![5, 9],
                raw_attributes: vec![194],
                status_bits: vec![0, 1],
                schema_layout: layout,
                ..MetricsConfig::default()
            },
        }
    }

    fn sample_probe(_disk: &DiskConfig, _mode: ProbeMode) -> Result<ProbeOutput, ProbeError> {
        Ok(ProbeOutput::new(0, SAMPLE))
    }

    #[test]
    fn test_wants_schema() {
        assert!(!wants_schema(false, None));
        assert!(!wants_schema(false, Some(OsStr::new(""))));
        assert!(wants_schema(false, Some(OsStr::new("1"))));
        assert!(wants_schema(true, None));
    }

    #[test]
    fn test_discover_uses_discovery_mode() {
        let config = config(SchemaLayout::PerDevice);
        let modes = RefCell::new(Vec::new());
        let probe = |disk: &DiskConfig, mode: ProbeMode| {
            modes.borrow_mut().push((disk.name.clone(), mode));
            sample_probe(disk, mode)
        };

        let labels = SchemaEmitter::new(&config).discover_labels(&probe);
        assert_eq!(labels.get(&194).map(String::as_str), Some("Temperature_Celsius"));
        assert_eq!(labels.len(), 17);
        assert_eq!(
            modes.into_inner(),
            vec![
                ("sda".to_string(), ProbeMode::Discovery),
                ("sdb".to_string(), ProbeMode::Discovery),
            ]
        );
    }

    #[test]
    fn test_discovery_skipped_without_attributes() {
        let mut config = config(SchemaLayout::PerDevice);
        config.metrics.normalized_attributes.clear();
        config.metrics.raw_attributes.clear();

        let probe = |_: &DiskConfig, _: ProbeMode| -> Result<ProbeOutput, ProbeError> {
            panic!("must not probe")
        };
        assert!(SchemaEmitter::new(&config).discover_labels(&probe).is_empty());
    }

    #[test]
    fn test_discovery_tolerates_failures() {
        let config = config(SchemaLayout::PerDevice);
        let probe = |disk: &DiskConfig, _: ProbeMode| match disk.name.as_str() {
            "sda" => Ok(ProbeOutput::new(2, "")),
            _ => Err(ProbeError::TimedOut {
                program: "smartctl".to_string(),
                timeout: std::time::Duration::from_secs(60),
            }),
        };

        let emitter = SchemaEmitter::new(&config);
        let labels = emitter.discover_labels(&probe);
        assert!(labels.is_empty());

        let schema = emitter.build(&labels);
        let raw = schema.get("smart.attributes.raw.#.194").unwrap();
        assert_eq!(raw.label, "SMART - Raw Attribute 194: unknown");
    }

    #[test]
    fn test_per_device_schema() {
        let config = config(SchemaLayout::PerDevice);
        let emitter = SchemaEmitter::new(&config);
        let schema = emitter.build(&emitter.discover_labels(&sample_probe));

        assert_eq!(schema.graphs.len(), 3);

        let status = schema.get("smart.status.#").unwrap();
        assert_eq!(status.label, "SMART - Status");
        assert_eq!(status.metric_names().collect::<Vec<_>>(), vec!["all", "0", "1"]);
        assert_eq!(status.metrics[2].label, "1:Device open failed");

        let normalized = schema.get("smart.attributes.normalized.#").unwrap();
        assert_eq!(normalized.metric_names().collect::<Vec<_>>(), vec!["5", "9"]);
        assert_eq!(normalized.metrics[0].label, "5:Reallocated_Sector_Ct");
        assert_eq!(normalized.metrics[1].label, "9:Power_On_Hours");

        let raw = schema.get("smart.attributes.raw.#.194").unwrap();
        assert_eq!(raw.label, "SMART - Raw Attribute 194: Temperature_Celsius");
        assert_eq!(raw.metric_names().collect::<Vec<_>>(), vec!["value"]);
    }

    #[test]
    fn test_per_metric_kind_schema() {
        let config = config(SchemaLayout::PerMetricKind);
        let emitter = SchemaEmitter::new(&config);
        let schema = emitter.build(&emitter.discover_labels(&sample_probe));

        let status = schema.get("smart.status").unwrap();
        assert_eq!(
            status.metric_names().collect::<Vec<_>>(),
            vec!["sda--all", "sda--0", "sda--1", "sdb--all", "sdb--0", "sdb--1"]
        );
        assert_eq!(status.metrics[2].label, "sda: 1:Device open failed");

        let normalized = schema.get("smart.attributes.normalized").unwrap();
        assert_eq!(
            normalized.metric_names().collect::<Vec<_>>(),
            vec!["sda--5", "sda--9", "sdb--5", "sdb--9"]
        );

        let raw = schema.get("smart.attributes.raw.194").unwrap();
        assert_eq!(raw.metric_names().collect::<Vec<_>>(), vec!["sda", "sdb"]);
        assert_eq!(raw.metrics[0].label, "sda");
    }

    #[test]
    fn test_no_normalized_graph_when_unconfigured() {
        let mut config = config(SchemaLayout::PerDevice);
        config.metrics.normalized_attributes.clear();
        let emitter = SchemaEmitter::new(&config);
        let schema = emitter.build(&AttributeLabels::new());
        assert!(schema.get("smart.attributes.normalized.#").is_none());
        assert_eq!(schema.graphs.len(), 2);
    }

    #[test]
    fn test_emit_output_format() {
        let config = config(SchemaLayout::PerDevice);
        let mut out = Vec::new();
        SchemaEmitter::new(&config).emit(&sample_probe, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let (marker, json) = text.split_once('\n').unwrap();
        assert_eq!(marker, "# mackerel-agent-plugin");
        assert!(json.starts_with("{\n    \"graphs\": {"));

        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(
            value["graphs"]["smart.attributes.raw.#.194"]["metrics"][0]["label"],
            "Temperature_Celsius"
        );
        assert_eq!(value["graphs"]["smart.status.#"]["unit"], "integer");
    }
}
