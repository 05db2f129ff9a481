use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use weir_core::{
    GroupSeries, MetricGroup, MetricLabelFilter, MetricsBackend, QueryRange, RangeQuery,
};

use crate::errors::{PanelError, Result};
use crate::runner::{RequestRunner, RunOutcome};

/// Result of one group's fetch within a cycle.
#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub group_key: String,
    pub result: GroupResult,
}

#[derive(Debug, Clone)]
pub enum GroupResult {
    /// Fresh data for the graph.
    Series(GroupSeries),
    /// The group's previous request was still in flight; its graph keeps
    /// whatever it last showed.
    Skipped,
    /// The fetch failed; only this graph is affected.
    Failed(String),
}

#[derive(Debug, Clone)]
enum CatalogEntry {
    Groups(Arc<Vec<MetricGroup>>),
    /// Listing failed. Kept so a broken scope is not re-listed on every
    /// tick; cleared by [`MetricFanOut::reload_catalog`], or by
    /// [`MetricFanOut::forget_failure`] when the panel enters the scope.
    Failed(String),
}

/// Issues every metric group's range query in parallel, one guarded request
/// slot per group of each scope.
///
/// The slots are independent: a slow CPU graph can drop its own polling
/// cycles for minutes while the memory graph next to it keeps refreshing.
/// Catalogs are listed once per scope and cached, failures included.
pub struct MetricFanOut {
    backend: Arc<dyn MetricsBackend>,
    group_labels: Vec<String>,
    op_timeout: Duration,
    catalogs: DashMap<String, CatalogEntry>,
    runners: DashMap<(String, String), Arc<RequestRunner>>,
}

impl MetricFanOut {
    pub fn new(
        backend: Arc<dyn MetricsBackend>,
        group_labels: Vec<String>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            group_labels,
            op_timeout,
            catalogs: DashMap::new(),
            runners: DashMap::new(),
        }
    }

    /// One polling cycle: query every group of `scope` in parallel over the
    /// shared filter and range. Groups whose previous request is still in
    /// flight come back [`GroupResult::Skipped`]; groups that fail report
    /// their error without touching their neighbors. The only cycle-level
    /// error is an unavailable catalog.
    pub async fn poll(
        &self,
        scope: &str,
        filter: &MetricLabelFilter,
        range: QueryRange,
    ) -> Result<Vec<GroupOutcome>> {
        self.poll_inner(scope, filter, range, false).await
    }

    /// One-shot cycle for a manual refresh: waits out in-flight requests
    /// instead of skipping, so the user's click always produces an answer.
    pub async fn poll_forced(
        &self,
        scope: &str,
        filter: &MetricLabelFilter,
        range: QueryRange,
    ) -> Result<Vec<GroupOutcome>> {
        self.poll_inner(scope, filter, range, true).await
    }

    async fn poll_inner(
        &self,
        scope: &str,
        filter: &MetricLabelFilter,
        range: QueryRange,
        forced: bool,
    ) -> Result<Vec<GroupOutcome>> {
        let groups = self.catalog(scope).await?;

        let mut tasks = Vec::with_capacity(groups.len());
        for group in groups.iter() {
            let backend = Arc::clone(&self.backend);
            let runner = self.runner(scope, &group.key);
            let query = RangeQuery {
                metrics: group.metrics.clone(),
                filter: filter.clone(),
                range,
                group_labels: self.group_labels.clone(),
            };
            let group_key = group.key.clone();
            tasks.push(tokio::spawn(async move {
                let key_for_series = group_key.clone();
                let fetch = async move {
                    let series = backend.query_range(&query).await?;
                    Ok(GroupSeries {
                        group_key: key_for_series,
                        series,
                    })
                };
                let run = if forced {
                    runner.run_forced(fetch).await.map(RunOutcome::Completed)
                } else {
                    runner.run(fetch).await
                };
                let result = match run {
                    Ok(RunOutcome::Completed(series)) => GroupResult::Series(series),
                    Ok(RunOutcome::Skipped) => GroupResult::Skipped,
                    Err(err) => GroupResult::Failed(err.to_string()),
                };
                GroupOutcome { group_key, result }
            }));
        }

        let keys: Vec<String> = groups.iter().map(|group| group.key.clone()).collect();
        let mut outcomes = Vec::with_capacity(keys.len());
        for (key, joined) in keys.into_iter().zip(join_all(tasks).await) {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    warn!(target = "fanout", group = %key, error = %err, "group fetch task failed");
                    outcomes.push(GroupOutcome {
                        group_key: key,
                        result: GroupResult::Failed(format!("fetch task failed: {}", err)),
                    });
                }
            }
        }
        Ok(outcomes)
    }

    /// Forget the cached catalog (or cached failure) for `scope`, forcing a
    /// fresh listing on the next cycle.
    pub fn reload_catalog(&self, scope: &str) {
        self.catalogs.remove(scope);
    }

    /// Drop a cached listing failure for `scope`; a healthy cached catalog
    /// is kept. The panel calls this on entering a scope, so navigating
    /// back to one that failed earlier retries the listing.
    pub fn forget_failure(&self, scope: &str) {
        self.catalogs
            .remove_if(scope, |_, entry| matches!(entry, CatalogEntry::Failed(_)));
    }

    /// Catalog for `scope`, listed once and cached. A failed listing is
    /// cached too, as the error it produced.
    async fn catalog(&self, scope: &str) -> Result<Arc<Vec<MetricGroup>>> {
        if let Some(entry) = self.catalogs.get(scope) {
            return match entry.value() {
                CatalogEntry::Groups(groups) => Ok(Arc::clone(groups)),
                CatalogEntry::Failed(message) => Err(PanelError::Catalog {
                    scope: scope.to_string(),
                    message: message.clone(),
                }),
            };
        }

        debug!(target = "fanout", scope, "listing metric catalog");
        match self.backend.list_metric_groups(scope).await {
            Ok(groups) => {
                let groups = Arc::new(groups);
                self.catalogs
                    .insert(scope.to_string(), CatalogEntry::Groups(Arc::clone(&groups)));
                Ok(groups)
            }
            Err(err) => {
                let message = err.to_string();
                warn!(target = "fanout", scope, error = %message, "metric catalog listing failed");
                self.catalogs
                    .insert(scope.to_string(), CatalogEntry::Failed(message.clone()));
                Err(PanelError::Catalog {
                    scope: scope.to_string(),
                    message,
                })
            }
        }
    }

    /// The request slot for a group, created on first use. Slots are keyed
    /// per scope, so a group name reused across scopes does not share one.
    fn runner(&self, scope: &str, group_key: &str) -> Arc<RequestRunner> {
        let entry = self
            .runners
            .entry((scope.to_string(), group_key.to_string()))
            .or_insert_with(|| Arc::new(RequestRunner::with_timeout(self.op_timeout)));
        Arc::clone(entry.value())
    }
}
