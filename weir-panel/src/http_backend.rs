use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use weir_core::{
    legend_for, BackendError, MetricDescriptor, MetricGroup, MetricSeries, MetricsBackend,
    RangeQuery, SeriesPoint,
};

/// Where and how the HTTP backend reaches the metrics API.
#[derive(Clone, Debug)]
pub struct HttpBackendConfig {
    /// Base url of a Prometheus compatible query API, e.g. `http://127.0.0.1:9090`.
    pub base_url: String,
    /// Management API path serving per-scope catalogs of metric groups.
    pub catalog_path: String,
    /// Per-request timeout at the HTTP client level, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9090".to_string(),
            catalog_path: "/api/v1/metric_groups".to_string(),
            timeout_ms: 5_000,
        }
    }
}

/// Prometheus-compatible [`MetricsBackend`] over HTTP.
///
/// Range queries go to `/api/v1/query_range`, one per metric of the group,
/// with the label filter rendered as a selector on the metric name. Catalogs
/// come from the management API as plain JSON [`MetricGroup`] lists.
#[derive(Clone)]
pub struct HttpBackend {
    cfg: HttpBackendConfig,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(cfg: HttpBackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|err| BackendError::Transport(err.to_string()))?;
        Ok(Self { cfg, http })
    }

    async fn fetch_metric(
        &self,
        query: &RangeQuery,
        metric_key: &str,
    ) -> Result<PromResponse, BackendError> {
        let url = format!("{}/api/v1/query_range", self.cfg.base_url);
        let expr = format!("{}{}", metric_key, query.filter.selector());
        let start = query.range.start.to_string();
        let end = query.range.end.to_string();
        let step = query.range.step.to_string();
        debug!(target = "http_backend", expr = %expr, start = %start, end = %end, step = %step, "issuing range query");

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("query", expr.as_str()),
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("step", step.as_str()),
            ])
            .send()
            .await
            .map_err(|err| BackendError::Transport(err.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: PromResponse = resp
            .json()
            .await
            .map_err(|err| BackendError::Decode(err.to_string()))?;
        if body.status != "success" {
            return Err(BackendError::Rejected(
                body.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(body)
    }
}

#[async_trait]
impl MetricsBackend for HttpBackend {
    async fn query_range(&self, query: &RangeQuery) -> Result<Vec<MetricSeries>, BackendError> {
        let mut out = Vec::new();
        for metric in &query.metrics {
            let body = self.fetch_metric(query, &metric.key).await?;
            out.extend(series_from_response(metric, body, &query.group_labels));
        }
        Ok(out)
    }

    async fn list_metric_groups(&self, scope: &str) -> Result<Vec<MetricGroup>, BackendError> {
        let url = format!("{}{}", self.cfg.base_url, self.cfg.catalog_path);
        let resp = self
            .http
            .get(&url)
            .query(&[("scope", scope)])
            .send()
            .await
            .map_err(|err| BackendError::Transport(err.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<Vec<MetricGroup>>()
            .await
            .map_err(|err| BackendError::Decode(err.to_string()))
    }
}

/// Response envelope of the Prometheus query API.
#[derive(Debug, Deserialize)]
struct PromResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: PromData,
}

#[derive(Debug, Default, Deserialize)]
struct PromData {
    #[serde(default)]
    result: Vec<PromResult>,
}

#[derive(Debug, Deserialize)]
struct PromResult {
    #[serde(default)]
    metric: HashMap<String, String>,
    /// Samples as `[unix_seconds, "value"]` pairs.
    #[serde(default)]
    values: Vec<(f64, String)>,
}

/// Flatten one metric's response into legended series with ascending,
/// numeric points. Samples whose value does not parse are dropped, the way
/// the console treats missing scrapes.
fn series_from_response(
    metric: &MetricDescriptor,
    body: PromResponse,
    group_labels: &[String],
) -> Vec<MetricSeries> {
    let mut out = Vec::new();
    for answer in body.data.result {
        let mut points: Vec<SeriesPoint> = answer
            .values
            .iter()
            .filter_map(|(ts, value)| value.parse::<f64>().ok().map(|v| (*ts as i64, v)))
            .collect();
        points.sort_by_key(|(ts, _)| *ts);
        out.push(MetricSeries {
            metric_key: metric.key.clone(),
            unit: metric.unit.clone(),
            legend: legend_for(&metric.key, &answer.metric, group_labels),
            points,
        });
    }
    out
}
