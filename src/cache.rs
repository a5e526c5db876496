//! Report throttling.
//!
//! Each disk has one cache file, `<cache_dir>/<escaped disk name>`, holding
//! the Unix timestamp of its last report that produced attributes. A disk is
//! probed again only once `min_report_periodicity` seconds have passed.
//!
//! Files are replaced by writing a temporary sibling and renaming it, so a
//! reader never sees a half-written timestamp.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::MetricsConfig;
use crate::error::CacheError;
use crate::naming::escape;

/// Outcome of the throttle check for one disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDecision {
    /// Throttling is off (`min_report_periodicity <= 0`).
    Unconfigured,
    /// No cache file yet.
    Cold,
    /// Last report is older than the period.
    Stale { age: i64 },
    /// Last report is within the period.
    Cool { age: i64 },
}

impl ReportDecision {
    pub fn should_report(&self) -> bool {
        !matches!(self, ReportDecision::Cool { .. })
    }
}

/// Per-disk last-report timestamps on disk.
#[derive(Debug, Clone)]
pub struct ReportCache {
    dir: PathBuf,
    min_report_periodicity: i64,
}

impl ReportCache {
    /// Create a cache in `dir` that throttles reports to one per
    /// `min_report_periodicity` seconds.
    pub fn new(dir: impl Into<PathBuf>, min_report_periodicity: i64) -> Self {
        Self {
            dir: dir.into(),
            min_report_periodicity,
        }
    }

    /// Cache configured by the `[metrics]` section.
    pub fn from_config(metrics: &MetricsConfig) -> Self {
        Self::new(&metrics.cache_dir_path, metrics.min_report_periodicity)
    }

    /// Whether throttling is active at all.
    pub fn is_enabled(&self) -> bool {
        self.min_report_periodicity > 0
    }

    /// Directory holding the cache files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file of a disk.
    pub fn path_for(&self, disk: &str) -> PathBuf {
        self.dir.join(escape(disk))
    }

    /// Read the cached timestamp. `Ok(None)` if there is no cache file.
    pub fn read(&self, disk: &str) -> Result<Option<i64>, CacheError> {
        let path = self.path_for(disk);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        let first_line = content.lines().next().unwrap_or("").trim();
        first_line
            .parse()
            .map(Some)
            .map_err(|_| CacheError::Corrupt {
                path,
                content: first_line.to_string(),
            })
    }

    /// Write `timestamp` as the last report time of a disk.
    ///
    /// The cache directory is created if needed.
    pub fn write(&self, disk: &str, timestamp: i64) -> Result<(), CacheError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| CacheError::Io { path, source }
        };

        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;

        let path = self.path_for(disk);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", escape(disk), std::process::id()));
        fs::write(&tmp, timestamp.to_string()).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_err(&path))?;
        Ok(())
    }

    /// Decide whether a disk is due for a report at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache file exists but cannot be read or
    /// does not hold a timestamp. Callers decide how to recover.
    pub fn check(&self, disk: &str, now: i64) -> Result<ReportDecision, CacheError> {
        if !self.is_enabled() {
            debug!("should report: min_report_periodicity <= 0");
            return Ok(ReportDecision::Unconfigured);
        }

        let Some(cached) = self.read(disk)? else {
            debug!("should report: no cache file at {}", self.path_for(disk).display());
            return Ok(ReportDecision::Cold);
        };

        let age = now - cached;
        debug!(
            "timestamp_now {} timestamp_cached {} diff {}",
            now, cached, age
        );
        if age > self.min_report_periodicity {
            debug!("should report: diff > min_report_periodicity");
            Ok(ReportDecision::Stale { age })
        } else {
            debug!("should not report: diff <= min_report_periodicity");
            Ok(ReportDecision::Cool { age })
        }
    }

    /// Record a successful report. Does nothing when throttling is off.
    ///
    /// Returns whether a cache file was written.
    pub fn record_report(&self, disk: &str, now: i64) -> Result<bool, CacheError> {
        if !self.is_enabled() {
            return Ok(false);
        }
        self.write(disk, now)?;
        Ok(true)
    }
}
