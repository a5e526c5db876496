//! Sample - one line of the metric stream.

use std::fmt;

/// Value of a single sample.
///
/// Attribute readings are forwarded verbatim, so a value is either a number
/// computed by the plugin or the text the diagnostic tool printed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum SampleValue {
    Integer(i64),
    Text(String),
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Integer(v) => write!(f, "{}", v),
            SampleValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for SampleValue {
    fn from(v: i64) -> Self {
        SampleValue::Integer(v)
    }
}

impl From<u8> for SampleValue {
    fn from(v: u8) -> Self {
        SampleValue::Integer(i64::from(v))
    }
}

impl From<String> for SampleValue {
    fn from(s: String) -> Self {
        SampleValue::Text(s)
    }
}

impl From<&str> for SampleValue {
    fn from(s: &str) -> Self {
        SampleValue::Text(s.to_string())
    }
}

/// A single timestamped metric sample.
///
/// Rendered with [`fmt::Display`] as `<name>\t<value>\t<timestamp>`, which is
/// the line format the agent reads from a plugin's standard output.
///
/// # Example
///
/// ```rust
/// use smart_metrics_types::Sample;
///
/// let sample = Sample::new("smart.attributes.raw.sda.194.value", "41", 1703160000);
/// assert_eq!(sample.to_string(), "smart.attributes.raw.sda.194.value\t41\t1703160000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Dotted metric name.
    pub name: String,

    /// Metric value.
    pub value: SampleValue,

    /// Unix timestamp in seconds.
    pub timestamp: i64,
}

impl Sample {
    /// Create a sample.
    pub fn new(name: impl Into<String>, value: impl Into<SampleValue>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            timestamp,
        }
    }

    /// Parse one line of the metric stream.
    ///
    /// Values that look like integers come back as [`SampleValue::Integer`].
    /// Returns `None` if the line does not have exactly three tab-separated
    /// fields or the timestamp is not an integer.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.trim_end_matches(['\r', '\n']).split('\t');
        let name = fields.next()?;
        let value = fields.next()?;
        let timestamp = fields.next()?.parse().ok()?;
        if fields.next().is_some() || name.is_empty() {
            return None;
        }

        let value = match value.parse::<i64>() {
            Ok(v) if v.to_string() == value => SampleValue::Integer(v),
            _ => SampleValue::Text(value.to_string()),
        };

        Some(Self {
            name: name.to_string(),
            value,
            timestamp,
        })
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.name, self.value, self.timestamp)
    }
}
