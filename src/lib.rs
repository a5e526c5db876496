//! # mackerel-plugin-smart
//!
//! A mackerel-agent plugin that reports S.M.A.R.T. disk health.
//!
//! Each invocation runs `smartctl -a` once per configured disk, decodes its
//! exit status, reads the attribute table and prints one metric sample per
//! line for the agent to pick up. When the agent asks for plugin meta data
//! the plugin prints a graph schema instead.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                            runner                              │
//! │  ┌────────┐   ┌────────┐   ┌──────────┐   ┌─────────┐          │
//! │  │ cache  │──▶│ probe  │──▶│  status  │──▶│ emitter │──▶ stdout│
//! │  │(throttle)  │smartctl│   │  parser  │   │ naming  │          │
//! │  └────────┘   └────────┘   └──────────┘   └─────────┘          │
//! │                    │                                           │
//! │                    ▼                                           │
//! │               ┌────────┐                                       │
//! │               │ schema │──▶ stdout (discovery only)            │
//! │               └────────┘                                       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`config`]**: INI + environment configuration, validated into [`PluginConfig`]
//! - **[`probe`]**: the [`DiagnosticProbe`] seam and the real [`SmartctlProbe`]
//! - **[`status`]**: exit status bits and their meanings
//! - **[`parser`]**: the revision 16 attribute table
//! - **[`naming`]**: escaping and metric names for both schema layouts
//! - **[`cache`]**: per-disk last-report timestamps
//! - **[`emitter`]** and **[`schema`]**: sample lines and the graph schema
//! - **[`runner`]**: one invocation over all disks
//!
//! ## Usage
//!
//! ```
//! use mackerel_plugin_smart::{DiskConfig, MetricsConfig, PluginConfig, ProbeMode, ProbeOutput, Runner};
//! use mackerel_plugin_smart::error::ProbeError;
//!
//! let config = PluginConfig {
//!     disks: vec![DiskConfig::new("sda", "/dev/sda")],
//!     metrics: MetricsConfig {
//!         status_bits: vec![1],
//!         ..MetricsConfig::default()
//!     },
//! };
//!
//! // a sleeping disk
//! let probe = |_: &DiskConfig, _: ProbeMode| Ok::<_, ProbeError>(ProbeOutput::new(2, ""));
//!
//! let mut out = Vec::new();
//! let code = Runner::new(&config, probe).run(&mut out).unwrap();
//! assert_eq!(code, 0);
//! ```

pub mod cache;
pub mod config;
pub mod emitter;
pub mod error;
pub mod logging;
pub mod naming;
pub mod parser;
pub mod probe;
pub mod runner;
pub mod schema;
pub mod status;

// Re-export main types for convenience
pub use cache::{ReportCache, ReportDecision};
pub use config::{DiskConfig, MetricsConfig, PluginConfig};
pub use emitter::MetricEmitter;
pub use error::{CacheError, ConfigError, ParseError, ProbeError, RunError};
pub use naming::{escape, MetricNamer, SchemaLayout};
pub use parser::{AttributeParser, AttributeRecord, ColumnCheck};
pub use probe::{DiagnosticProbe, ProbeMode, ProbeOutput, SmartctlProbe};
pub use runner::{DiskOutcome, Runner};
pub use schema::SchemaEmitter;
pub use status::ExitStatus;
