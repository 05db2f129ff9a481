use serde::{Deserialize, Serialize};

/// One metric drawn inside a group's graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    /// Identifier the backend query is issued for, e.g. `node_cpu_usage`.
    pub key: String,
    /// Display unit, e.g. `%`, `MB/s`, `ops`.
    pub unit: String,
}

impl MetricDescriptor {
    pub fn new(key: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            unit: unit.into(),
        }
    }
}

/// One graph of a monitoring page: a titled set of metrics that are queried
/// together and rendered into a single chart.
///
/// The catalog of groups for a scope comes from the management API and is
/// data, not code: pages differ per scope (cluster, host, topic, ...) without
/// the engine knowing any group by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricGroup {
    /// Stable identifier; also keys the group's request slot in the panel.
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub metrics: Vec<MetricDescriptor>,
}

impl MetricGroup {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            description: String::new(),
            metrics: Vec::new(),
        }
    }

    pub fn with_metric(mut self, key: impl Into<String>, unit: impl Into<String>) -> Self {
        self.metrics.push(MetricDescriptor::new(key, unit));
        self
    }
}
