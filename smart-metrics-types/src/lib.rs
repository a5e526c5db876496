//! # smart-metrics-types
//!
//! Value types for the two formats a mackerel agent plugin speaks: the
//! tab-separated metric stream printed on every invocation and the JSON
//! graph definition printed once when the agent asks for plugin meta data.
//!
//! ## Features
//!
//! - `serde`: serialization of [`GraphSchema`] (and the sample types) via serde
//!
//! ## Example
//!
//! ```rust
//! use smart_metrics_types::{GraphSchema, Sample, Unit};
//!
//! let schema = GraphSchema::builder()
//!     .graph("smart.status.#", |g| {
//!         g.label("SMART - Status")
//!             .unit(Unit::Integer)
//!             .metric("all", "all")
//!     })
//!     .build();
//! assert_eq!(schema.graphs.len(), 1);
//!
//! let sample = Sample::new("smart.status.sda.all", 0u8, 1703160000);
//! assert_eq!(sample.to_string(), "smart.status.sda.all\t0\t1703160000");
//! ```

mod graph;
mod sample;

pub use graph::*;
pub use sample::*;

/// First line of the plugin meta output.
///
/// The agent only treats the following JSON as a graph definition when it is
/// preceded by exactly this line.
pub const PLUGIN_META_MARKER: &str = "# mackerel-agent-plugin";

/// Environment variable the agent sets when it wants the graph definition
/// instead of samples.
pub const PLUGIN_META_ENV: &str = "MACKEREL_AGENT_PLUGIN_META";
