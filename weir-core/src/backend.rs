use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::{MetricDescriptor, MetricGroup};
use crate::filter::MetricLabelFilter;
use crate::range::QueryRange;
use crate::series::MetricSeries;

pub mod in_memory;

#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached at the transport level.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success HTTP status.
    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body did not match the expected envelope.
    #[error("unable to decode backend response: {0}")]
    Decode(String),

    /// The backend processed the request and rejected it.
    #[error("query rejected: {0}")]
    Rejected(String),
}

/// One fetch for a metric group: which metrics to read, how the query is
/// scoped, and over which window.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    pub metrics: Vec<MetricDescriptor>,
    pub filter: MetricLabelFilter,
    pub range: QueryRange,
    /// Label keys that keep multiple answering entities apart in legends.
    pub group_labels: Vec<String>,
}

/// Source of metric catalogs and time series data.
///
/// The panel engine only talks to its backend through this trait, so tests
/// run against [`in_memory::InMemoryBackend`] and production against the
/// HTTP implementation in the panel crate.
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Fetch the series for every metric in `query` over its window.
    async fn query_range(&self, query: &RangeQuery) -> Result<Vec<MetricSeries>, BackendError>;

    /// List the metric groups a scope renders, e.g. every graph of the
    /// "host" page.
    async fn list_metric_groups(&self, scope: &str) -> Result<Vec<MetricGroup>, BackendError>;
}
