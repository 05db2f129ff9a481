use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// One scoping pair, e.g. `cluster=us-east` or `host=10.0.0.12`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

/// Ordered label set narrowing every query a panel issues.
///
/// Keys are unique; setting a key that is already present replaces its value
/// in place, so the rendered selector stays stable while the user switches
/// between entities. Updates return a new filter rather than mutating, which
/// keeps filter values safe to hash and compare across panel snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricLabelFilter {
    labels: Vec<Label>,
}

impl MetricLabelFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The filter with `key` set to `value`, replacing an existing entry for
    /// the same key in place.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.labels.iter_mut().find(|label| label.key == key) {
            Some(label) => label.value = value,
            None => self.labels.push(Label { key, value }),
        }
        self
    }

    /// The filter without any entry for `key`.
    pub fn without(mut self, key: &str) -> Self {
        self.labels.retain(|label| label.key != key);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|label| label.key == key)
            .map(|label| label.value.as_str())
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Prometheus-style selector for this filter, `{k="v",k2="v2"}` in
    /// insertion order. An empty filter renders as an empty string, which
    /// leaves the metric unscoped.
    pub fn selector(&self) -> String {
        if self.labels.is_empty() {
            return String::new();
        }
        let mut out = String::from("{");
        for (pos, label) in self.labels.iter().enumerate() {
            if pos > 0 {
                out.push(',');
            }
            // write! to a String cannot fail
            let _ = write!(out, "{}=\"{}\"", label.key, label.value);
        }
        out.push('}');
        out
    }
}
