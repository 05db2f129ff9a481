use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{BackendError, MetricsBackend, RangeQuery};
use crate::catalog::MetricGroup;
use crate::filter::MetricLabelFilter;
use crate::series::{legend_for, MetricSeries, SeriesPoint};

/// One stored answer line for a metric: a label set plus raw samples.
#[derive(Debug, Clone, Default)]
struct StoredSeries {
    labels: HashMap<String, String>,
    points: Vec<SeriesPoint>,
}

/// In-memory metrics backend, programmable per metric.
/// SHOULD BE USED ONLY FOR TESTING PURPOSES
///
/// Stored samples are clipped to the queried window and answered in
/// ascending timestamp order. Per-metric delays and failures can be injected
/// to simulate slow or broken upstreams, and call counters expose how often
/// the backend was actually hit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    catalogs: Arc<DashMap<String, Vec<MetricGroup>>>,
    series: Arc<DashMap<String, Vec<StoredSeries>>>,
    delays: Arc<DashMap<String, Duration>>,
    failures: Arc<DashMap<String, String>>,
    catalog_failures: Arc<DashMap<String, String>>,
    query_calls: Arc<AtomicU64>,
    metric_calls: Arc<DashMap<String, u64>>,
    catalog_calls: Arc<AtomicU64>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the catalog answered for `scope`.
    pub fn put_catalog(&self, scope: impl Into<String>, groups: Vec<MetricGroup>) {
        self.catalogs.insert(scope.into(), groups);
    }

    /// Register one answer line for `metric_key`. A metric may hold several
    /// lines with different labels, like several hosts answering one query.
    pub fn put_series(
        &self,
        metric_key: impl Into<String>,
        labels: &[(&str, &str)],
        points: Vec<SeriesPoint>,
    ) {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.series
            .entry(metric_key.into())
            .or_default()
            .push(StoredSeries { labels, points });
    }

    /// Stall every query touching `metric_key` by `delay`.
    pub fn delay(&self, metric_key: impl Into<String>, delay: Duration) {
        self.delays.insert(metric_key.into(), delay);
    }

    /// Fail every query touching `metric_key` with `message`.
    pub fn fail(&self, metric_key: impl Into<String>, message: impl Into<String>) {
        self.failures.insert(metric_key.into(), message.into());
    }

    /// Fail catalog listing for `scope` with `message`.
    pub fn fail_catalog(&self, scope: impl Into<String>, message: impl Into<String>) {
        self.catalog_failures.insert(scope.into(), message.into());
    }

    /// Remove an injected delay or failure for `metric_key`.
    pub fn heal(&self, metric_key: &str) {
        self.delays.remove(metric_key);
        self.failures.remove(metric_key);
        self.catalog_failures.remove(metric_key);
    }

    pub fn query_calls(&self) -> u64 {
        self.query_calls.load(Ordering::Relaxed)
    }

    /// How many queries asked for `metric_key`, counted when the query
    /// arrives rather than when it answers.
    pub fn query_calls_for(&self, metric_key: &str) -> u64 {
        self.metric_calls
            .get(metric_key)
            .map(|entry| *entry.value())
            .unwrap_or(0)
    }

    pub fn catalog_calls(&self) -> u64 {
        self.catalog_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MetricsBackend for InMemoryBackend {
    async fn query_range(&self, query: &RangeQuery) -> Result<Vec<MetricSeries>, BackendError> {
        self.query_calls.fetch_add(1, Ordering::Relaxed);
        for metric in &query.metrics {
            *self.metric_calls.entry(metric.key.clone()).or_default() += 1;
        }

        // the longest injected delay among the requested metrics stalls the
        // whole group fetch, like one slow upstream would
        let delay = query
            .metrics
            .iter()
            .filter_map(|metric| self.delays.get(&metric.key).map(|entry| *entry.value()))
            .max();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut out = Vec::new();
        for metric in &query.metrics {
            if let Some(message) = self.failures.get(&metric.key) {
                return Err(BackendError::Rejected(message.value().clone()));
            }
            let stored = match self.series.get(&metric.key) {
                Some(stored) => stored,
                None => continue,
            };
            for line in stored.value() {
                if !filter_matches(&query.filter, &line.labels) {
                    continue;
                }
                let mut points: Vec<SeriesPoint> = line
                    .points
                    .iter()
                    .copied()
                    .filter(|(ts, _)| *ts >= query.range.start && *ts <= query.range.end)
                    .collect();
                points.sort_by_key(|(ts, _)| *ts);
                out.push(MetricSeries {
                    metric_key: metric.key.clone(),
                    unit: metric.unit.clone(),
                    legend: legend_for(&metric.key, &line.labels, &query.group_labels),
                    points,
                });
            }
        }
        Ok(out)
    }

    async fn list_metric_groups(&self, scope: &str) -> Result<Vec<MetricGroup>, BackendError> {
        self.catalog_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(message) = self.catalog_failures.get(scope) {
            return Err(BackendError::Rejected(message.value().clone()));
        }
        Ok(self
            .catalogs
            .get(scope)
            .map(|groups| groups.value().clone())
            .unwrap_or_default())
    }
}

fn filter_matches(filter: &MetricLabelFilter, labels: &HashMap<String, String>) -> bool {
    filter
        .labels()
        .iter()
        .all(|label| labels.get(&label.key).map(String::as_str) == Some(label.value.as_str()))
}
