use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write;

/// One sample: (unix seconds, value).
pub type SeriesPoint = (i64, f64);

/// One renderable line of a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    /// The metric this line was queried for.
    pub metric_key: String,
    pub unit: String,
    /// Legend entry distinguishing this line: the metric key, qualified by
    /// the group labels when several entities answer the same query.
    pub legend: String,
    /// Samples in ascending timestamp order.
    pub points: Vec<SeriesPoint>,
}

/// Everything one graph needs to render: the lines of all metrics in the
/// group, already legended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSeries {
    pub group_key: String,
    pub series: Vec<MetricSeries>,
}

/// Legend key for one returned series.
///
/// Group labels decide whether several entities (e.g. several hosts) stay
/// distinct lines or collapse into one: every group label present on the
/// series qualifies the metric key, in the order the panel listed them, as
/// `metric_key{host=10.0.0.12}`. With no group label matched the metric key
/// stands alone.
pub fn legend_for(
    metric_key: &str,
    series_labels: &HashMap<String, String>,
    group_labels: &[String],
) -> String {
    let mut qualifiers = group_labels
        .iter()
        .filter_map(|key| series_labels.get(key).map(|value| (key, value)))
        .peekable();

    if qualifiers.peek().is_none() {
        return metric_key.to_string();
    }

    let mut legend = String::from(metric_key);
    legend.push('{');
    for (pos, (key, value)) in qualifiers.enumerate() {
        if pos > 0 {
            legend.push(',');
        }
        let _ = write!(legend, "{}={}", key, value);
    }
    legend.push('}');
    legend
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legend_without_group_labels_is_the_metric_key() {
        let labels = HashMap::from([("instance".to_string(), "b1".to_string())]);
        assert_eq!(legend_for("cpu_usage", &labels, &[]), "cpu_usage");
    }

    #[test]
    fn legend_qualifies_with_matched_group_labels_in_order() {
        let labels = HashMap::from([
            ("host".to_string(), "10.0.0.12".to_string()),
            ("core".to_string(), "3".to_string()),
            ("job".to_string(), "node".to_string()),
        ]);
        let legend = legend_for("cpu_usage", &labels, &["host".into(), "core".into()]);
        assert_eq!(legend, "cpu_usage{host=10.0.0.12,core=3}");
    }

    #[test]
    fn legend_skips_group_labels_absent_from_the_series() {
        let labels = HashMap::from([("host".to_string(), "10.0.0.12".to_string())]);
        let legend = legend_for("cpu_usage", &labels, &["core".into(), "host".into()]);
        assert_eq!(legend, "cpu_usage{host=10.0.0.12}");
    }
}
