//! One plugin invocation: probe every disk, print samples, refresh the
//! throttle cache and work out the process exit code.

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use smart_metrics_types::Sample;
use tracing::{debug, error, info, info_span, warn};

use crate::cache::ReportCache;
use crate::config::{DiskConfig, PluginConfig};
use crate::emitter::{write_samples, MetricEmitter};
use crate::error::{ProbeError, RunError};
use crate::parser::AttributeParser;
use crate::probe::{DiagnosticProbe, ProbeMode, ProbeOutput};
use crate::schema::SchemaEmitter;
use crate::status::{ExitStatus, COMMAND_FAILED_BIT, OPEN_FAILED_BIT};

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// What happened to a single disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskOutcome {
    /// Reported recently; not probed.
    Throttled,
    /// The device could not be opened (or did not answer in time).
    OpenFailed,
    /// No attributes could be read; the status joins the exit code.
    Failed { status: ExitStatus },
    /// Attributes were read.
    Reported { attributes: usize },
}

/// Drives a full invocation over all configured disks.
pub struct Runner<'a, P> {
    config: &'a PluginConfig,
    probe: P,
    cache: ReportCache,
    clock: fn() -> i64,
}

impl<'a, P: DiagnosticProbe> Runner<'a, P> {
    /// Create a runner using the wall clock and the configured cache.
    pub fn new(config: &'a PluginConfig, probe: P) -> Self {
        Self {
            config,
            probe,
            cache: ReportCache::from_config(&config.metrics),
            clock: unix_now,
        }
    }

    /// Replace the wall clock, for deterministic timestamps.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    /// The throttle cache in use.
    pub fn cache(&self) -> &ReportCache {
        &self.cache
    }

    /// Print the graph schema instead of samples.
    pub fn print_schema<W: Write>(&self, out: &mut W) -> Result<(), RunError> {
        SchemaEmitter::new(self.config).emit(&self.probe, out)
    }

    /// Process every disk in order and return the aggregate exit status.
    ///
    /// All samples of one invocation share a single timestamp.
    ///
    /// # Errors
    ///
    /// [`RunError::Fatal`] when a disk reports that smartctl rejected its
    /// command line; nothing is printed for that disk or any later one.
    /// [`RunError::Probe`] when smartctl cannot be started at all.
    pub fn run<W: Write>(&self, out: &mut W) -> Result<u8, RunError> {
        let mut aggregate = ExitStatus::OK;
        let now = (self.clock)();

        for disk in &self.config.disks {
            let _span = info_span!("disk", name = %disk.name).entered();
            let outcome = self.run_disk(disk, now, out)?;
            debug!("outcome {:?}", outcome);
            if let DiskOutcome::Failed { status } = outcome {
                aggregate = ExitStatus(aggregate.raw() | status.raw());
            }
        }

        Ok(aggregate.raw())
    }

    /// Process one disk at `now`, printing its samples.
    ///
    /// The attribute table is parsed even when no attribute is reported;
    /// its rows decide the cache update and its errors the exit status.
    pub fn run_disk<W: Write>(
        &self,
        disk: &DiskConfig,
        now: i64,
        out: &mut W,
    ) -> Result<DiskOutcome, RunError> {
        match self.cache.check(&disk.name, now) {
            Ok(decision) if !decision.should_report() => {
                info!("Skipping disk {}: {:?}", disk.name, decision);
                return Ok(DiskOutcome::Throttled);
            }
            Ok(decision) => debug!("Reporting disk {}: {:?}", disk.name, decision),
            Err(e) => warn!("{}; reporting anyway", e),
        }

        let emitter = MetricEmitter::new(self.config.namer(), &self.config.metrics);

        let output = match self.probe.probe(disk, ProbeMode::Report) {
            Ok(output) => output,
            Err(e @ ProbeError::TimedOut { .. }) => {
                info!("{}; treating {} as unreachable", e, disk.name);
                let status = ExitStatus::from_bit(OPEN_FAILED_BIT);
                self.emit(out, emitter.status_samples(&disk.name, status, now))?;
                return Ok(DiskOutcome::OpenFailed);
            }
            Err(e @ ProbeError::Terminated { .. }) => {
                error!("{}", e);
                let status = ExitStatus::from_bit(COMMAND_FAILED_BIT);
                self.emit(out, emitter.status_samples(&disk.name, status, now))?;
                return Ok(DiskOutcome::Failed { status });
            }
            Err(e) => return Err(e.into()),
        };

        let ProbeOutput { status, stdout, .. } = output;

        if status.is_fatal() {
            error!(
                "smartctl could not parse its command line (exit status {})",
                status.raw()
            );
            return Err(RunError::Fatal {
                disk: disk.name.clone(),
                status: status.raw(),
            });
        }

        if status.is_open_failure() {
            info!(
                "Failed to open device {} in path {}. Maybe sleeping, or you don't have the required privilege.",
                disk.name, disk.path
            );
            self.emit(out, emitter.status_samples(&disk.name, status, now))?;
            return Ok(DiskOutcome::OpenFailed);
        }

        let table = match AttributeParser::new(self.config.metrics.column_check).parse(&stdout) {
            Ok(table) => table,
            Err(e) => {
                error!(
                    "{} (exit status {}, path {}); smartctl output follows",
                    e,
                    status.raw(),
                    disk.path
                );
                for line in stdout.lines() {
                    error!("{}", line);
                }
                self.emit(out, emitter.status_samples(&disk.name, status, now))?;
                return Ok(DiskOutcome::Failed { status });
            }
        };

        self.emit(out, emitter.samples(&disk.name, status, &table.records, now))?;

        let attributes = table.len();
        if attributes > 0 {
            match self.cache.record_report(&disk.name, now) {
                Ok(true) => debug!("cache updated at {}", self.cache.path_for(&disk.name).display()),
                Ok(false) => {}
                Err(e) => warn!("{}", e),
            }
        }

        Ok(DiskOutcome::Reported { attributes })
    }

    fn emit<W: Write>(&self, out: &mut W, samples: Vec<Sample>) -> Result<(), RunError> {
        for sample in &samples {
            debug!("{}", sample);
        }
        write_samples(out, &samples)?;
        Ok(())
    }
}
