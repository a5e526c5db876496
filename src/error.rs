//! Error types for the plugin.
//!
//! Only [`ConfigError`] and [`RunError::Fatal`] end an invocation early;
//! everything else is scoped to a single disk and handled by the runner.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading and validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file does not exist.
    #[error("Config file {0} not found")]
    NotFound(PathBuf),

    /// The config document could not be read or parsed.
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    /// A required key is absent.
    #[error("[{section}] is missing required key `{key}`")]
    MissingKey { section: String, key: String },

    /// A section the plugin does not know, usually a typo.
    #[error("Unknown config section [{0}]")]
    UnknownSection(String),

    /// A key the section does not accept, usually a typo.
    #[error("[{section}] has unknown key `{key}`")]
    UnknownKey { section: String, key: String },

    /// A value could not be parsed or is out of range.
    #[error("[{section}] {key} = {value:?}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Two disks (or two metrics) would be reported under the same name.
    #[error("Metric name collision: {0}")]
    Collision(String),
}

/// Errors raised while parsing diagnostic output.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The structure revision marker line is missing.
    #[error("{0} not found")]
    IncompatibleFormat(&'static str),
}

/// Errors raised by the report cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache file could not be read or written.
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cache file does not start with an integer timestamp.
    #[error("Corrupt cache file {path}: {content:?}")]
    Corrupt { path: PathBuf, content: String },
}

/// Errors raised while running the diagnostic process.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The process could not be started at all.
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process did not finish within the configured timeout.
    #[error("{program} timed out after {timeout:?}")]
    TimedOut {
        program: String,
        timeout: std::time::Duration,
    },

    /// The process was terminated without an exit code.
    #[error("{program} was terminated by a signal")]
    Terminated { program: String },
}

/// Errors raised while setting up logging.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The syslog socket could not be opened.
    #[error("Failed to connect to syslog at {path}: {source}")]
    Syslog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A global subscriber is already installed.
    #[error("Failed to initialize logging: {0}")]
    Init(String),
}

/// Errors that abort a whole invocation.
#[derive(Debug, Error)]
pub enum RunError {
    /// The diagnostic tool rejected its command line (status bit 0).
    #[error("smartctl could not parse its command line for disk {disk} (exit status {status})")]
    Fatal { disk: String, status: u8 },

    /// The diagnostic program could not be started.
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// Writing samples or the schema to the output failed.
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    /// The schema could not be serialized.
    #[error("Failed to serialize graph schema: {0}")]
    Schema(#[from] serde_json::Error),
}

impl RunError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Fatal { status, .. } => i32::from(*status),
            _ => 1,
        }
    }
}
