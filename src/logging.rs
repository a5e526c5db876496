//! Logging setup.
//!
//! Every event goes to stderr as
//! `mackerel-plugin-smart[<pid>] (<LEVEL>) <spans>: <message>`, and
//! optionally to the local syslog daemon as well. Standard output is
//! reserved for samples and the schema.

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::LoggingError;

/// Program name used as the log prefix and syslog tag.
pub const IDENT: &str = "mackerel-plugin-smart";

/// Default syslog socket.
pub const DEFAULT_SYSLOG_DEVICE: &str = "/dev/log";

/// Syslog facility `user`.
const FACILITY_USER: u8 = 1;

/// Where and how much to log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// Log DEBUG events (otherwise INFO and above).
    pub debug: bool,
    /// Also send events to this syslog socket.
    pub syslog_device: Option<PathBuf>,
}

impl LogConfig {
    /// Most verbose level to log.
    pub fn level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` directives, when set, take precedence over the level chosen
/// by [`LogConfig::debug`].
///
/// # Errors
///
/// Fails when the syslog socket cannot be opened or a subscriber is
/// already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::builder()
        .with_default_directive(config.level().into())
        .from_env_lossy();

    let stderr = tracing_subscriber::fmt::layer()
        .event_format(PluginFormat::new())
        .with_ansi(false)
        .with_writer(io::stderr);

    let syslog = match config.syslog_device {
        Some(ref path) => Some(
            tracing_subscriber::fmt::layer()
                .event_format(PluginFormat::new())
                .with_ansi(false)
                .with_writer(SyslogWriter::connect(path)?),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(syslog)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))
}

/// Single-line event format with the program name and pid up front.
#[derive(Debug, Clone)]
pub struct PluginFormat {
    pid: u32,
}

impl PluginFormat {
    /// Format stamped with the current process id.
    pub fn new() -> Self {
        Self {
            pid: std::process::id(),
        }
    }
}

impl Default for PluginFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, N> FormatEvent<S, N> for PluginFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{}[{}] ({}) ", IDENT, self.pid, event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{}: ", fields)?;
                    }
                }
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Syslog severity for a tracing level.
pub fn severity(level: &Level) -> u8 {
    match *level {
        Level::ERROR => 3,
        Level::WARN => 4,
        Level::INFO => 6,
        _ => 7,
    }
}

/// Sends each formatted event as one datagram to a syslog socket.
#[derive(Debug, Clone)]
pub struct SyslogWriter {
    #[cfg(unix)]
    socket: Arc<std::os::unix::net::UnixDatagram>,
}

impl SyslogWriter {
    #[cfg(unix)]
    pub fn connect(path: &Path) -> Result<Self, LoggingError> {
        let err = |source| LoggingError::Syslog {
            path: path.to_path_buf(),
            source,
        };
        let socket = std::os::unix::net::UnixDatagram::unbound().map_err(err)?;
        socket.connect(path).map_err(err)?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    #[cfg(not(unix))]
    pub fn connect(path: &Path) -> Result<Self, LoggingError> {
        Err(LoggingError::Syslog {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Unsupported, "syslog sockets need unix"),
        })
    }

    fn line(&self, level: &Level) -> SyslogLine {
        SyslogLine {
            #[cfg(unix)]
            socket: Arc::clone(&self.socket),
            priority: FACILITY_USER * 8 + severity(level),
            buf: Vec::new(),
        }
    }
}

impl<'a> MakeWriter<'a> for SyslogWriter {
    type Writer = SyslogLine;

    fn make_writer(&'a self) -> Self::Writer {
        self.line(&Level::INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.line(meta.level())
    }
}

/// One buffered syslog message, sent when dropped.
pub struct SyslogLine {
    #[cfg(unix)]
    socket: Arc<std::os::unix::net::UnixDatagram>,
    priority: u8,
    buf: Vec<u8>,
}

impl Write for SyslogLine {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogLine {
    fn drop(&mut self) {
        while self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
        if self.buf.is_empty() {
            return;
        }
        let mut message = format!("<{}>", self.priority).into_bytes();
        message.extend_from_slice(&self.buf);

        // nowhere to report a failing log sink
        #[cfg(unix)]
        let _ = self.socket.send(&message);
    }
}
