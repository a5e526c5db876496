//! Running the diagnostic tool.
//!
//! The runner only sees the [`DiagnosticProbe`] trait, so tests (and other
//! front ends) can substitute scripted output for a real smartctl. Any
//! `Fn(&DiskConfig, ProbeMode) -> Result<ProbeOutput, ProbeError>` closure is
//! a probe.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::config::{DiskConfig, MetricsConfig};
use crate::error::ProbeError;
use crate::status::ExitStatus;

/// Why a disk is probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// Regular sampling; honours the disk's `nocheck` setting.
    Report,
    /// Schema discovery; always reads the disk, ignoring `nocheck`.
    Discovery,
}

/// Captured result of one diagnostic run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProbeOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProbeOutput {
    /// Output with an exit status and stdout, and no stderr.
    pub fn new(status: u8, stdout: impl Into<String>) -> Self {
        Self {
            status: ExitStatus(status),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// Source of diagnostic output for a disk.
pub trait DiagnosticProbe {
    /// Run the diagnostic for `disk` and capture its result.
    ///
    /// A non-zero exit status is not an error here; it is part of the
    /// output. Errors mean no exit status exists at all.
    fn probe(&self, disk: &DiskConfig, mode: ProbeMode) -> Result<ProbeOutput, ProbeError>;
}

impl<F> DiagnosticProbe for F
where
    F: Fn(&DiskConfig, ProbeMode) -> Result<ProbeOutput, ProbeError>,
{
    fn probe(&self, disk: &DiskConfig, mode: ProbeMode) -> Result<ProbeOutput, ProbeError> {
        self(disk, mode)
    }
}

/// smartctl arguments for a disk: `-a [-d <type>] [-n <nocheck>] <path>`.
pub fn smartctl_args(disk: &DiskConfig, mode: ProbeMode) -> Vec<String> {
    let mut args = vec!["-a".to_string()];
    if let Some(ref device_type) = disk.device_type {
        args.push("-d".to_string());
        args.push(device_type.clone());
    }
    if mode == ProbeMode::Report {
        if let Some(ref nocheck) = disk.nocheck {
            args.push("-n".to_string());
            args.push(nocheck.clone());
        }
    }
    args.push(disk.path.clone());
    args
}

/// Probe that runs the smartctl executable with a timeout.
///
/// Runs are strictly sequential: each call blocks on a single-threaded
/// runtime owned by the probe.
#[derive(Debug)]
pub struct SmartctlProbe {
    program: String,
    timeout: Duration,
    runtime: Runtime,
}

impl SmartctlProbe {
    /// Create a probe running `program` with a per-call `timeout`.
    pub fn new(program: impl Into<String>, timeout: Duration) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            program: program.into(),
            timeout,
            runtime,
        })
    }

    /// Probe configured by the `[metrics]` section.
    pub fn from_config(metrics: &MetricsConfig) -> std::io::Result<Self> {
        Self::new(metrics.smartctl_path.clone(), metrics.probe_timeout)
    }

    async fn run(&self, args: Vec<String>) -> Result<ProbeOutput, ProbeError> {
        debug!("smart_args {} {:?}", self.program, args);

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| ProbeError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ProbeError::Spawn {
                    program: self.program.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(ProbeError::TimedOut {
                    program: self.program.clone(),
                    timeout: self.timeout,
                })
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            warn!("{}", line);
        }

        let code = output.status.code().ok_or_else(|| ProbeError::Terminated {
            program: self.program.clone(),
        })?;
        debug!("returncode {}", code);

        Ok(ProbeOutput {
            status: ExitStatus((code & 0xFF) as u8),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }
}

impl DiagnosticProbe for SmartctlProbe {
    fn probe(&self, disk: &DiskConfig, mode: ProbeMode) -> Result<ProbeOutput, ProbeError> {
        debug!("do_smartctl disk {} mode {:?}", disk.name, mode);
        let args = smartctl_args(disk, mode);
        self.runtime.block_on(self.run(args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn disk() -> DiskConfig {
        DiskConfig {
            id: "0".to_string(),
            name: "sda".to_string(),
            path: "/dev/sda".to_string(),
            device_type: Some("sat".to_string()),
            nocheck: Some("standby".to_string()),
        }
    }

    #[test]
    fn test_report_args_include_nocheck() {
        assert_eq!(
            smartctl_args(&disk(), ProbeMode::Report),
            vec!["-a", "-d", "sat", "-n", "standby", "/dev/sda"]
        );
    }

    #[test]
    fn test_discovery_args_skip_nocheck() {
        assert_eq!(
            smartctl_args(&disk(), ProbeMode::Discovery),
            vec!["-a", "-d", "sat", "/dev/sda"]
        );
    }

    #[test]
    fn test_minimal_args() {
        let disk = DiskConfig::new("sdb", "/dev/sdb");
        assert_eq!(smartctl_args(&disk, ProbeMode::Report), vec!["-a", "/dev/sdb"]);
    }

    #[test]
    fn test_closure_is_a_probe() {
        let probe = |disk: &DiskConfig, _mode: ProbeMode| {
            Ok::<_, ProbeError>(ProbeOutput::new(4, disk.path.clone()))
        };
        let output = probe.probe(&disk(), ProbeMode::Report).unwrap();
        assert_eq!(output.status, ExitStatus(4));
        assert_eq!(output.stdout, "/dev/sda");
    }

    // `sh -a <script>` runs the script, so the shell stands in for smartctl.
    #[cfg(unix)]
    fn script_disk(body: &str) -> (tempfile::TempDir, DiskConfig) {
        let dir = tempdir().unwrap();
        let script = dir.path().join("fake-smartctl.sh");
        fs::write(&script, body).unwrap();
        let disk = DiskConfig::new("fake", script.to_string_lossy());
        (dir, disk)
    }

    #[cfg(unix)]
    #[test]
    fn test_smartctl_probe_captures_output_and_status() {
        let (_dir, disk) = script_disk("echo 'hello'\necho 'oops' >&2\nexit 64\n");
        let probe = SmartctlProbe::new("sh", Duration::from_secs(10)).unwrap();

        let output = probe.probe(&disk, ProbeMode::Report).unwrap();
        assert_eq!(output.status, ExitStatus(64));
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.stderr, "oops\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_smartctl_probe_times_out() {
        let (_dir, disk) = script_disk("sleep 5\n");
        let probe = SmartctlProbe::new("sh", Duration::from_millis(200)).unwrap();

        let err = probe.probe(&disk, ProbeMode::Report).unwrap_err();
        assert!(matches!(err, ProbeError::TimedOut { .. }));
        assert_eq!(err.to_string(), "sh timed out after 200ms");
    }

    #[test]
    fn test_smartctl_probe_missing_program() {
        let probe = SmartctlProbe::new("/nonexistent/smartctl", Duration::from_secs(1)).unwrap();
        let err = probe.probe(&disk(), ProbeMode::Report).unwrap_err();
        assert!(matches!(err, ProbeError::Spawn { .. }));
    }
}
