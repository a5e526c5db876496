//! Turning one disk's probe result into samples.

use std::collections::HashSet;
use std::io::{self, Write};

use smart_metrics_types::Sample;

use crate::config::MetricsConfig;
use crate::naming::{MetricNamer, StatusMetric};
use crate::parser::AttributeRecord;
use crate::status::ExitStatus;

/// Builds the samples of one disk from its exit status and attribute rows.
#[derive(Debug, Clone, Copy)]
pub struct MetricEmitter<'a> {
    namer: MetricNamer,
    metrics: &'a MetricsConfig,
}

impl<'a> MetricEmitter<'a> {
    /// Create an emitter naming samples with `namer`.
    pub fn new(namer: MetricNamer, metrics: &'a MetricsConfig) -> Self {
        Self { namer, metrics }
    }

    /// The masked `all` metric followed by one metric per configured bit.
    pub fn status_samples(&self, disk: &str, status: ExitStatus, timestamp: i64) -> Vec<Sample> {
        let mut samples = Vec::with_capacity(self.metrics.status_bits.len() + 1);
        samples.push(Sample::new(
            self.namer.status(disk, StatusMetric::All),
            status.masked(self.metrics.status_mask),
            timestamp,
        ));
        for (bit, value) in status.decode(&self.metrics.status_bits) {
            samples.push(Sample::new(
                self.namer.status(disk, StatusMetric::Bit(bit)),
                value,
                timestamp,
            ));
        }
        samples
    }

    /// Configured normalized and raw readings, in the order the rows appeared.
    ///
    /// Readings are forwarded verbatim. Rows without a usable ID or without
    /// the needed column are skipped; a repeated ID is reported once.
    pub fn attribute_samples(
        &self,
        disk: &str,
        records: &[AttributeRecord],
        timestamp: i64,
    ) -> Vec<Sample> {
        let mut samples = Vec::new();
        let mut seen = HashSet::new();

        for record in records {
            let Some(id) = record.id() else {
                continue;
            };
            if !seen.insert(id) {
                continue;
            }
            if self.metrics.normalized_attributes.contains(&id) {
                if let Some(value) = record.value() {
                    samples.push(Sample::new(self.namer.normalized(disk, id), value, timestamp));
                }
            }
            if self.metrics.raw_attributes.contains(&id) {
                if let Some(raw) = record.raw_value() {
                    samples.push(Sample::new(self.namer.raw(disk, id), raw, timestamp));
                }
            }
        }
        samples
    }

    /// Status samples followed by attribute samples.
    pub fn samples(
        &self,
        disk: &str,
        status: ExitStatus,
        records: &[AttributeRecord],
        timestamp: i64,
    ) -> Vec<Sample> {
        let mut samples = self.status_samples(disk, status, timestamp);
        samples.extend(self.attribute_samples(disk, records, timestamp));
        samples
    }
}

/// Write samples, one line each.
pub fn write_samples<W: Write>(out: &mut W, samples: &[Sample]) -> io::Result<()> {
    for sample in samples {
        writeln!(out, "{}", sample)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::SchemaLayout;
    use crate::parser::parse_attributes;
    use smart_metrics_types::SampleValue;

    const SAMPLE: &str = include_str!("../tests/fixtures/smartctl-a.txt");
    const TS: i64 = 1_703_160_000;

    fn metrics() -> MetricsConfig {
        MetricsConfig {
            normalized_attributes: vec![5, 9],
            raw_attributes: vec![194],
            status_bits: vec![0, 1, 6],
            status_mask: 0xFC,
            ..MetricsConfig::default()
        }
    }

    #[test]
    fn test_status_samples() {
        let metrics = metrics();
        let emitter = MetricEmitter::new(MetricNamer::default(), &metrics);
        let samples = emitter.status_samples("sda", ExitStatus(0b0100_0011), TS);

        let lines: Vec<String> = samples.iter().map(|s| s.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "smart.status.sda.all\t64\t1703160000",
                "smart.status.sda.0\t1\t1703160000",
                "smart.status.sda.1\t1\t1703160000",
                "smart.status.sda.6\t1\t1703160000",
            ]
        );
    }

    #[test]
    fn test_attribute_samples_verbatim() {
        let metrics = metrics();
        let emitter = MetricEmitter::new(MetricNamer::default(), &metrics);
        let records = parse_attributes(SAMPLE).unwrap();
        let samples = emitter.attribute_samples("sda", &records, TS);

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].name, "smart.attributes.normalized.sda.5");
        assert_eq!(samples[0].value, SampleValue::Text("165".to_string()));
        assert_eq!(samples[1].name, "smart.attributes.normalized.sda.9");
        assert_eq!(samples[1].value, SampleValue::Text("053".to_string()));
        assert_eq!(samples[2].name, "smart.attributes.raw.sda.194.value");
        assert_eq!(samples[2].value, SampleValue::Text("41".to_string()));
    }

    #[test]
    fn test_per_metric_kind_names() {
        let metrics = metrics();
        let emitter = MetricEmitter::new(MetricNamer::new(SchemaLayout::PerMetricKind), &metrics);
        let records = parse_attributes(SAMPLE).unwrap();
        let names: Vec<String> = emitter
            .samples("my disk", ExitStatus::OK, &records, TS)
            .into_iter()
            .map(|s| s.name)
            .collect();

        assert_eq!(
            names,
            vec![
                "smart.status.my_disk--all",
                "smart.status.my_disk--0",
                "smart.status.my_disk--1",
                "smart.status.my_disk--6",
                "smart.attributes.normalized.my_disk--5",
                "smart.attributes.normalized.my_disk--9",
                "smart.attributes.raw.194.my_disk",
            ]
        );
    }

    #[test]
    fn test_unconfigured_attributes_are_ignored() {
        let metrics = MetricsConfig::default();
        let emitter = MetricEmitter::new(MetricNamer::default(), &metrics);
        let records = parse_attributes(SAMPLE).unwrap();
        assert!(emitter.attribute_samples("sda", &records, TS).is_empty());
    }

    #[test]
    fn test_write_samples() {
        let samples = vec![
            Sample::new("a.b", 1i64, TS),
            Sample::new("a.c", "41", TS),
        ];
        let mut out = Vec::new();
        write_samples(&mut out, &samples).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "a.b\t1\t1703160000\na.c\t41\t1703160000\n"
        );
    }
}
