//! Plugin configuration.
//!
//! The config file is an INI document with one `[disks.<id>]` section per
//! monitored disk and a single `[metrics]` section:
//!
//! ```ini
//! [disks.0]
//! name = sda
//! path = /dev/sda
//! device_type = sat
//! nocheck = standby
//!
//! [metrics]
//! normalized_attributes = 5, 9
//! raw_attributes = 194
//! status = 0, 1, 2, 3, 4, 5, 6, 7
//! status_mask = 0xFC
//! min_report_periodicity = 600
//! cache_dir_path = /var/cache/mackerel-plugin-smart.cache
//! ```
//!
//! Any key can be overridden from the environment, e.g.
//! `MACKEREL_PLUGIN_SMART__METRICS__MIN_REPORT_PERIODICITY=0`.
//!
//! Everything is parsed and validated up front into [`PluginConfig`]; nothing
//! downstream looks at the raw document again.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::builder::DefaultState;
use ::config::{Config, ConfigBuilder, Environment, File, FileFormat, Map, Source, Value};

use crate::error::ConfigError;
use crate::naming::{check_disk_names, check_metric_names, MetricNamer, SchemaLayout};
use crate::parser::ColumnCheck;
use crate::status::ALL_BITS;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/mackerel-agent/mackerel-plugin-smart.conf";
pub const DEFAULT_CACHE_DIR: &str = "/var/cache/mackerel-plugin-smart.cache";
pub const DEFAULT_SMARTCTL: &str = "smartctl";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Prefix of environment variables that override config keys.
pub const ENV_PREFIX: &str = "MACKEREL_PLUGIN_SMART";

const DISKS_SECTION: &str = "disks";
const METRICS_SECTION: &str = "metrics";

const DISK_KEYS: &[&str] = &["name", "path", "device_type", "nocheck"];
const METRICS_KEYS: &[&str] = &[
    "normalized_attributes",
    "raw_attributes",
    "status",
    "status_mask",
    "min_report_periodicity",
    "cache_dir_path",
    "schema_layout",
    "strict_columns",
    "smartctl_path",
    "probe_timeout",
];

/// One monitored disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskConfig {
    /// Section id (`<id>` in `[disks.<id>]`).
    pub id: String,
    /// User-facing name; metric names and the cache file derive from it.
    pub name: String,
    /// Device file passed to smartctl.
    pub path: String,
    /// smartctl `-d` value.
    pub device_type: Option<String>,
    /// smartctl `-n` value, e.g. `standby` to avoid waking a sleeping disk.
    pub nocheck: Option<String>,
}

impl DiskConfig {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            path: path.into(),
            device_type: None,
            nocheck: None,
        }
    }
}

/// Contents of the `[metrics]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    /// Attribute IDs whose `VALUE` column is reported.
    pub normalized_attributes: Vec<u8>,
    /// Attribute IDs whose `RAW_VALUE` column is reported.
    pub raw_attributes: Vec<u8>,
    /// Status bits reported one metric each.
    pub status_bits: Vec<u8>,
    /// Mask applied to the exit status for the `all` metric.
    pub status_mask: u8,
    /// Minimum seconds between reports of one disk; 0 reports every time.
    pub min_report_periodicity: i64,
    pub cache_dir_path: PathBuf,
    pub schema_layout: SchemaLayout,
    pub column_check: ColumnCheck,
    pub smartctl_path: String,
    pub probe_timeout: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            normalized_attributes: Vec::new(),
            raw_attributes: Vec::new(),
            status_bits: ALL_BITS.to_vec(),
            status_mask: 0xFF,
            min_report_periodicity: 0,
            cache_dir_path: PathBuf::from(DEFAULT_CACHE_DIR),
            schema_layout: SchemaLayout::default(),
            column_check: ColumnCheck::default(),
            smartctl_path: DEFAULT_SMARTCTL.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Validated plugin configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginConfig {
    /// Disks ordered by section id: numeric ids by value, then the rest by name.
    pub disks: Vec<DiskConfig>,
    pub metrics: MetricsConfig,
}

impl PluginConfig {
    /// Load the config file at `path`, with environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let builder = Config::builder()
            .add_source(File::from(path).format(FileFormat::Ini))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));
        Self::build(builder)
    }

    /// Parse an INI document without environment overrides.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(File::from_str(text, FileFormat::Ini)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let root = builder.build()?.collect()?;
        let config = Self::from_tables(root)?;
        config.validate()?;
        Ok(config)
    }

    fn from_tables(root: Map<String, Value>) -> Result<Self, ConfigError> {
        let mut disk_sections: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
        let mut metrics = MetricsConfig::default();

        for (key, value) in root {
            if key == DISKS_SECTION {
                // `[disks.sda]` arrives nested as disks -> sda
                for (id, table) in value.into_table()? {
                    disk_sections.insert(id, table.into_table()?);
                }
            } else if let Some(id) = key.strip_prefix("disks.") {
                disk_sections.insert(id.to_string(), value.into_table()?);
            } else if key == METRICS_SECTION {
                metrics = parse_metrics(&lowercase_keys(value.into_table()?))?;
            } else {
                return Err(ConfigError::UnknownSection(key));
            }
        }

        let mut sections: Vec<_> = disk_sections.into_iter().collect();
        sections.sort_by_key(|(id, _)| section_order(id));

        let disks = sections
            .into_iter()
            .map(|(id, table)| parse_disk(id, &lowercase_keys(table)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { disks, metrics })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_disk_names(self.disks.iter().map(|d| d.name.as_str()))?;
        let names = self.namer().all_names(
            self.disks.iter().map(|d| d.name.as_str()),
            &self.metrics.status_bits,
            &self.metrics.normalized_attributes,
            &self.metrics.raw_attributes,
        );
        check_metric_names(&names)
    }

    /// Namer for the configured layout.
    pub fn namer(&self) -> MetricNamer {
        MetricNamer::new(self.metrics.schema_layout)
    }

    /// Whether any attribute (normalized or raw) is reported.
    pub fn wants_attributes(&self) -> bool {
        !self.metrics.normalized_attributes.is_empty() || !self.metrics.raw_attributes.is_empty()
    }
}

fn parse_disk(id: String, table: &Map<String, Value>) -> Result<DiskConfig, ConfigError> {
    let section = format!("{}.{}", DISKS_SECTION, id);
    check_keys(&section, table, DISK_KEYS)?;
    let name = required(table, &section, "name")?;
    let path = required(table, &section, "path")?;

    Ok(DiskConfig {
        id,
        name,
        path,
        device_type: optional(table, "device_type")?,
        nocheck: optional(table, "nocheck")?,
    })
}

fn parse_metrics(table: &Map<String, Value>) -> Result<MetricsConfig, ConfigError> {
    let mut metrics = MetricsConfig::default();
    let section = METRICS_SECTION;
    check_keys(section, table, METRICS_KEYS)?;

    if let Some(v) = optional(table, "normalized_attributes")? {
        metrics.normalized_attributes = parse_id_list(section, "normalized_attributes", &v)?;
    }
    if let Some(v) = optional(table, "raw_attributes")? {
        metrics.raw_attributes = parse_id_list(section, "raw_attributes", &v)?;
    }
    if let Some(v) = optional(table, "status")? {
        metrics.status_bits = parse_id_list(section, "status", &v)?;
        if let Some(bit) = metrics.status_bits.iter().find(|&&b| b > 7) {
            return Err(invalid(section, "status", &v, format!("bit {} is not in 0-7", bit)));
        }
    }
    if let Some(v) = optional(table, "status_mask")? {
        let mask = parse_mask(&v).map_err(|reason| invalid(section, "status_mask", &v, reason))?;
        metrics.status_mask = u8::try_from(mask)
            .map_err(|_| invalid(section, "status_mask", &v, "mask exceeds 8 bits"))?;
    }
    if let Some(v) = optional(table, "min_report_periodicity")? {
        metrics.min_report_periodicity = v
            .trim()
            .parse()
            .map_err(|e| invalid(section, "min_report_periodicity", &v, e))?;
    }
    if let Some(v) = optional(table, "cache_dir_path")? {
        metrics.cache_dir_path = PathBuf::from(v.trim());
    }
    if let Some(v) = optional(table, "schema_layout")? {
        metrics.schema_layout = v
            .parse()
            .map_err(|e: String| invalid(section, "schema_layout", &v, e))?;
    }
    if let Some(v) = optional(table, "strict_columns")? {
        let strict = parse_bool(&v).ok_or_else(|| {
            invalid(section, "strict_columns", &v, "expected true/false")
        })?;
        metrics.column_check = if strict {
            ColumnCheck::Strict
        } else {
            ColumnCheck::Lenient
        };
    }
    if let Some(v) = optional(table, "smartctl_path")? {
        metrics.smartctl_path = v.trim().to_string();
    }
    if let Some(v) = optional(table, "probe_timeout")? {
        let secs: u64 = v
            .trim()
            .parse()
            .map_err(|e| invalid(section, "probe_timeout", &v, e))?;
        if secs == 0 {
            return Err(invalid(section, "probe_timeout", &v, "must be positive"));
        }
        metrics.probe_timeout = Duration::from_secs(secs);
    }

    Ok(metrics)
}

/// Sort key for disk sections: numeric ids first, by value.
fn section_order(id: &str) -> (bool, u64) {
    match id.parse::<u64>() {
        Ok(n) => (false, n),
        Err(_) => (true, 0),
    }
}

/// Option names are case-insensitive; section names are not.
fn lowercase_keys(table: Map<String, Value>) -> Map<String, Value> {
    table
        .into_iter()
        .map(|(key, value)| (key.to_lowercase(), value))
        .collect()
}

fn check_keys(section: &str, table: &Map<String, Value>, known: &[&str]) -> Result<(), ConfigError> {
    let mut unknown: Vec<&String> = table
        .keys()
        .filter(|key| !known.contains(&key.as_str()))
        .collect();
    unknown.sort();
    match unknown.first() {
        Some(key) => Err(ConfigError::UnknownKey {
            section: section.to_string(),
            key: key.to_string(),
        }),
        None => Ok(()),
    }
}

fn optional(table: &Map<String, Value>, key: &str) -> Result<Option<String>, ConfigError> {
    match table.get(key) {
        Some(value) => Ok(Some(value.clone().into_string()?)),
        None => Ok(None),
    }
}

fn required(table: &Map<String, Value>, section: &str, key: &str) -> Result<String, ConfigError> {
    optional(table, key)?
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        })
}

fn invalid(section: &str, key: &str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse a comma-separated list of integers in 0-255. Blank means empty.
fn parse_id_list(section: &str, key: &str, s: &str) -> Result<Vec<u8>, ConfigError> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<u8>()
                .map_err(|e| invalid(section, key, s, format!("{:?}: {}", item, e)))
        })
        .collect()
}

/// Parse an integer in decimal or with a `0x`, `0o` or `0b` prefix.
pub fn parse_mask(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let (digits, radix) = if let Some(rest) = s.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = s.strip_prefix("0o") {
        (rest, 8)
    } else if let Some(rest) = s.strip_prefix("0b") {
        (rest, 2)
    } else {
        (s, 10)
    };
    u32::from_str_radix(digits, radix).map_err(|e| e.to_string())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE_CONFIG: &str = "\
[disks.1]
name = backup disk
path = /dev/sdb
nocheck = standby

[disks.0]
name = sda
path = /dev/sda
device_type = sat

[metrics]
normalized_attributes = 5, 9
raw_attributes = 194
status_mask = 0xFC
min_report_periodicity = 600
cache_dir_path = /tmp/smart-cache
";

    #[test]
    fn test_parse_sample_config() {
        let config = PluginConfig::from_ini_str(SAMPLE_CONFIG).unwrap();

        assert_eq!(config.disks.len(), 2);
        assert_eq!(config.disks[0].id, "0");
        assert_eq!(config.disks[0].name, "sda");
        assert_eq!(config.disks[0].device_type.as_deref(), Some("sat"));
        assert_eq!(config.disks[0].nocheck, None);
        assert_eq!(config.disks[1].name, "backup disk");
        assert_eq!(config.disks[1].nocheck.as_deref(), Some("standby"));

        let m = &config.metrics;
        assert_eq!(m.normalized_attributes, vec![5, 9]);
        assert_eq!(m.raw_attributes, vec![194]);
        assert_eq!(m.status_bits, ALL_BITS.to_vec());
        assert_eq!(m.status_mask, 0xFC);
        assert_eq!(m.min_report_periodicity, 600);
        assert_eq!(m.cache_dir_path, PathBuf::from("/tmp/smart-cache"));
        assert_eq!(m.schema_layout, SchemaLayout::PerDevice);
        assert_eq!(m.column_check, ColumnCheck::Lenient);
        assert_eq!(m.probe_timeout, DEFAULT_PROBE_TIMEOUT);
    }

    #[test]
    fn test_defaults_without_metrics_section() {
        let config = PluginConfig::from_ini_str("[disks.a]\nname = sda\npath = /dev/sda\n").unwrap();
        assert_eq!(config.metrics, MetricsConfig::default());
        assert!(!config.wants_attributes());
    }

    #[test]
    fn test_optional_metric_keys() {
        let config = PluginConfig::from_ini_str(
            "[metrics]\nstatus = 1, 3\nschema_layout = per-metric-kind\nstrict_columns = yes\n\
             smartctl_path = /usr/sbin/smartctl\nprobe_timeout = 15\nraw_attributes =\n",
        )
        .unwrap();
        let m = &config.metrics;
        assert_eq!(m.status_bits, vec![1, 3]);
        assert_eq!(m.schema_layout, SchemaLayout::PerMetricKind);
        assert_eq!(m.column_check, ColumnCheck::Strict);
        assert_eq!(m.smartctl_path, "/usr/sbin/smartctl");
        assert_eq!(m.probe_timeout, Duration::from_secs(15));
        assert!(m.raw_attributes.is_empty());
    }

    #[test]
    fn test_missing_path_is_error() {
        let err = PluginConfig::from_ini_str("[disks.a]\nname = sda\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { ref key, .. } if key == "path"));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        for doc in [
            "[metrics]\nnormalized_attributes = 5, x\n",
            "[metrics]\nraw_attributes = 256\n",
            "[metrics]\nstatus = 8\n",
            "[metrics]\nstatus_mask = 0x1FF\n",
            "[metrics]\nstatus_mask = 0xZZ\n",
            "[metrics]\nmin_report_periodicity = soon\n",
            "[metrics]\nschema_layout = grouped\n",
            "[metrics]\nstrict_columns = maybe\n",
            "[metrics]\nprobe_timeout = 0\n",
        ] {
            let err = PluginConfig::from_ini_str(doc).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { .. }), "{}: {}", doc, err);
        }
    }

    #[test]
    fn test_colliding_disk_names_are_rejected() {
        let err = PluginConfig::from_ini_str(
            "[disks.a]\nname = data disk\npath = /dev/sda\n\n[disks.b]\nname = data/disk\npath = /dev/sdb\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Collision(_)));
    }

    #[test]
    fn test_duplicate_attribute_ids_are_rejected() {
        let err = PluginConfig::from_ini_str(
            "[disks.a]\nname = sda\npath = /dev/sda\n\n[metrics]\nraw_attributes = 194, 194\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Collision(_)));
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        let err = PluginConfig::from_ini_str("[Metrics]\nraw_attributes = 194\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSection(ref s) if s == "Metrics"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = PluginConfig::from_ini_str("[metrics]\nraw_attribute = 194\n").unwrap_err();
        assert!(
            matches!(err, ConfigError::UnknownKey { ref section, ref key } if section == "metrics" && key == "raw_attribute")
        );

        let err = PluginConfig::from_ini_str("[disks.0]\nname = sda\npath = /dev/sda\ntype = sat\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { ref key, .. } if key == "type"));
    }

    #[test]
    fn test_option_names_ignore_case() {
        let config = PluginConfig::from_ini_str(
            "[disks.0]\nName = sda\nPATH = /dev/sda\n\n[metrics]\nRaw_Attributes = 194\n",
        )
        .unwrap();
        assert_eq!(config.disks[0].name, "sda");
        assert_eq!(config.disks[0].path, "/dev/sda");
        assert_eq!(config.metrics.raw_attributes, vec![194]);
    }

    #[test]
    fn test_numeric_section_ids_sort_by_value() {
        let config = PluginConfig::from_ini_str(
            "[disks.10]\nname = ten\npath = /dev/sdk\n\n\
             [disks.b]\nname = bee\npath = /dev/sdx\n\n\
             [disks.2]\nname = two\npath = /dev/sdc\n",
        )
        .unwrap();
        let ids: Vec<&str> = config.disks.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "10", "b"]);
    }

    #[test]
    fn test_parse_mask_prefixes() {
        assert_eq!(parse_mask("255"), Ok(255));
        assert_eq!(parse_mask(" 0xFC "), Ok(0xFC));
        assert_eq!(parse_mask("0o374"), Ok(0o374));
        assert_eq!(parse_mask("0b11111100"), Ok(0b1111_1100));
        assert!(parse_mask("0x").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", SAMPLE_CONFIG).unwrap();

        let config = PluginConfig::load(file.path()).unwrap();
        assert_eq!(config.disks.len(), 2);
    }

    #[test]
    fn test_load_applies_env_override() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", SAMPLE_CONFIG).unwrap();

        let var = format!("{}__METRICS__STATUS", ENV_PREFIX);
        std::env::set_var(&var, "1, 2");
        let loaded = PluginConfig::load(file.path());
        std::env::remove_var(&var);

        let config = loaded.unwrap();
        assert_eq!(config.metrics.status_bits, vec![1, 2]);
        assert_eq!(config.metrics.min_report_periodicity, 600);
    }

    #[test]
    fn test_load_missing_file() {
        let err = PluginConfig::load(Path::new("/nonexistent/mackerel-plugin-smart.conf")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
