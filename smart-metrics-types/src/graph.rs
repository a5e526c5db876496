//! Graph definitions - the schema a plugin publishes for its metrics.

use std::collections::BTreeMap;

/// Unit of a graph, as understood by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Unit {
    #[default]
    Integer,
}

/// One metric line within a graph.
///
/// `name` is the last component of the metric name. Together with the graph
/// key it forms the full name the samples are reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricDef {
    pub name: String,
    pub label: String,
}

/// A single graph: its display label, unit, and member metrics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphDef {
    pub label: String,
    pub unit: Unit,
    pub metrics: Vec<MetricDef>,
}

impl GraphDef {
    /// Names of the member metrics, in declaration order.
    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|m| m.name.as_str())
    }
}

/// The complete graph definition document.
///
/// Graph keys may contain `#` (one dotted component) or `*` wildcards; the
/// agent groups samples whose names match the key pattern into one graph.
///
/// # Example
///
/// ```rust
/// use smart_metrics_types::GraphSchema;
///
/// let schema = GraphSchema::builder()
///     .graph("smart.attributes.raw.#.194", |g| {
///         g.label("SMART - Raw Attribute 194: Temperature_Celsius")
///             .metric("value", "Temperature_Celsius")
///     })
///     .build();
///
/// assert!(schema.get("smart.attributes.raw.#.194").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphSchema {
    /// Graphs keyed by their metric-name prefix.
    pub graphs: BTreeMap<String, GraphDef>,
}

impl GraphSchema {
    /// Create a builder for constructing schemas.
    pub fn builder() -> GraphSchemaBuilder {
        GraphSchemaBuilder::new()
    }

    /// Get a graph by key.
    pub fn get(&self, key: &str) -> Option<&GraphDef> {
        self.graphs.get(key)
    }

    /// Total number of metric members across all graphs.
    pub fn metric_count(&self) -> usize {
        self.graphs.values().map(|g| g.metrics.len()).sum()
    }
}

/// Builder for constructing `GraphSchema` instances.
#[derive(Debug, Default)]
pub struct GraphSchemaBuilder {
    graphs: BTreeMap<String, GraphDef>,
}

impl GraphSchemaBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a graph built using a closure.
    pub fn graph<F>(mut self, key: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(GraphDefBuilder) -> GraphDefBuilder,
    {
        let graph = f(GraphDefBuilder::new()).build();
        self.graphs.insert(key.into(), graph);
        self
    }

    /// Build the schema.
    pub fn build(self) -> GraphSchema {
        GraphSchema {
            graphs: self.graphs,
        }
    }
}

/// Builder for a single graph.
#[derive(Debug, Default)]
pub struct GraphDefBuilder {
    label: String,
    unit: Unit,
    metrics: Vec<MetricDef>,
}

impl GraphDefBuilder {
    /// Create a new builder with the default unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the display label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the unit.
    pub fn unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    /// Append a member metric.
    pub fn metric(mut self, name: impl Into<String>, label: impl Into<String>) -> Self {
        self.metrics.push(MetricDef {
            name: name.into(),
            label: label.into(),
        });
        self
    }

    /// Build the graph.
    pub fn build(self) -> GraphDef {
        GraphDef {
            label: self.label,
            unit: self.unit,
            metrics: self.metrics,
        }
    }
}
