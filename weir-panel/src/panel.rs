use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use weir_core::{MetricLabelFilter, MetricsBackend, QueryRange, DEFAULT_WINDOW_SECS};

use crate::fanout::{GroupOutcome, MetricFanOut};
use crate::refresh::{RefreshMode, RefreshSchedule};
use crate::runner::DEFAULT_OP_TIMEOUT;

/// Initial configuration of a panel.
#[derive(Debug, Clone)]
pub struct PanelOptions {
    /// Scope whose metric groups the panel renders, e.g. `host` or `topic`.
    pub scope: String,
    /// Label filter every query is scoped by.
    pub filter: MetricLabelFilter,
    /// Label keys that keep multiple answering entities apart in legends.
    pub group_labels: Vec<String>,
    /// Starting window; the last hour when absent.
    pub initial_range: Option<QueryRange>,
    /// Cadence the panel starts with.
    pub initial_refresh: RefreshMode,
    /// Ceiling for one guarded backend fetch.
    pub op_timeout: Duration,
}

impl Default for PanelOptions {
    fn default() -> Self {
        Self {
            scope: "default".to_string(),
            filter: MetricLabelFilter::new(),
            group_labels: Vec::new(),
            initial_range: None,
            initial_refresh: RefreshMode::Off,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }
}

/// Who produced a range update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    /// The embedding page pushed a complete range; applied verbatim, step
    /// included.
    External,
    /// The user edited bounds in the panel's own picker; the step is
    /// re-derived from them.
    Internal,
}

/// A range change tagged with its origin.
///
/// Everything that moves the window funnels through
/// [`FilterRangePanel::apply_range_update`] with the origin explicit, so an
/// external echo of the panel's own value can never be mistaken for a fresh
/// edit and feed a derivation loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeUpdate {
    pub source: UpdateSource,
    pub range: QueryRange,
}

/// The panel state at one instant, as published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSnapshot {
    /// Monotonic count of query-affecting changes. Range, filter and scope
    /// updates bump it; a cadence change alone does not.
    pub revision: u64,
    pub range: QueryRange,
    pub filter: MetricLabelFilter,
    pub scope: String,
    pub refresh: RefreshMode,
    /// The latest change came from a manual refresh and must be queried on
    /// the waiting path rather than the drop-if-busy path.
    pub one_shot: bool,
}

/// Latest fan-out answer, one outcome per metric group.
#[derive(Debug, Clone, Default)]
pub struct SeriesSnapshot {
    /// Revision of the [`PanelSnapshot`] this answer was queried for. The
    /// seed value before any cycle ran is 0; real answers start at 1.
    pub revision: u64,
    pub groups: Vec<GroupOutcome>,
    /// Catalog-level failure; the panel had no groups to query.
    pub error: Option<String>,
}

/// Query state machine of one monitoring page.
///
/// The panel owns the query window, label filter, scope and refresh cadence.
/// Every change is published as a [`PanelSnapshot`], and a poller task
/// answers each query-affecting change with a parallel fan-out across the
/// scope's metric groups, publishing [`SeriesSnapshot`]s for renderers to
/// watch. Fan-out cycles may overlap; each group's request slot decides
/// whether it joins a cycle or sits it out.
///
/// Stop it with [`FilterRangePanel::close`]; an unclosed panel keeps its
/// poller task alive.
pub struct FilterRangePanel {
    shared: Arc<PanelShared>,
    fanout: Arc<MetricFanOut>,
    schedule: Mutex<Option<RefreshSchedule>>,
    series_rx: watch::Receiver<SeriesSnapshot>,
    cancel: CancellationToken,
    poller: Mutex<Option<JoinHandle<()>>>,
}

struct PanelShared {
    snap_tx: watch::Sender<PanelSnapshot>,
}

impl PanelShared {
    /// The single reducer for window movement; see [`RangeUpdate`].
    fn apply_range_update(&self, update: RangeUpdate) {
        self.snap_tx.send_modify(|snap| {
            snap.range = match update.source {
                UpdateSource::External => update.range,
                UpdateSource::Internal => QueryRange::new(update.range.start, update.range.end),
            };
            snap.one_shot = false;
            snap.revision += 1;
        });
    }

    /// One schedule tick: slide the window so it ends now, step unchanged.
    fn tick(&self) {
        let now = Utc::now().timestamp();
        self.snap_tx.send_modify(|snap| {
            // a straggler tick can fire while polling is being turned off;
            // the mode check keeps Off meaning "the window does not move"
            if !snap.refresh.is_polling() {
                return;
            }
            snap.range = snap.range.slide_to(now);
            snap.one_shot = false;
            snap.revision += 1;
        });
    }
}

impl FilterRangePanel {
    /// Spawn the panel: resolve the starting window, start the poller task
    /// and apply the initial cadence. The first cycle queries right away;
    /// that is the initial render.
    pub async fn start(options: PanelOptions, backend: Arc<dyn MetricsBackend>) -> Self {
        let now = Utc::now().timestamp();
        let range = options
            .initial_range
            .unwrap_or_else(|| QueryRange::last(DEFAULT_WINDOW_SECS, now));
        let (snap_tx, _) = watch::channel(PanelSnapshot {
            revision: 1,
            range,
            filter: options.filter.clone(),
            scope: options.scope.clone(),
            refresh: RefreshMode::Off,
            one_shot: false,
        });
        let shared = Arc::new(PanelShared { snap_tx });
        let fanout = Arc::new(MetricFanOut::new(
            backend,
            options.group_labels.clone(),
            options.op_timeout,
        ));
        let (series_tx, series_rx) = watch::channel(SeriesSnapshot::default());
        let cancel = CancellationToken::new();
        let poller = spawn_poller(
            Arc::clone(&shared),
            Arc::clone(&fanout),
            series_tx,
            cancel.clone(),
        );

        let panel = Self {
            shared,
            fanout,
            schedule: Mutex::new(None),
            series_rx,
            cancel,
            poller: Mutex::new(Some(poller)),
        };
        info!(target = "panel", scope = %options.scope, "panel started");
        panel.select_refresh(options.initial_refresh).await;
        panel
    }

    /// Current panel state.
    pub fn snapshot(&self) -> PanelSnapshot {
        self.shared.snap_tx.borrow().clone()
    }

    pub fn current_range(&self) -> QueryRange {
        self.shared.snap_tx.borrow().range
    }

    pub fn refresh_mode(&self) -> RefreshMode {
        self.shared.snap_tx.borrow().refresh
    }

    /// Watch the panel state; fires on every change.
    pub fn subscribe(&self) -> watch::Receiver<PanelSnapshot> {
        self.shared.snap_tx.subscribe()
    }

    /// Watch the latest series answer per metric group.
    pub fn subscribe_series(&self) -> watch::Receiver<SeriesSnapshot> {
        self.series_rx.clone()
    }

    /// The series answers as an async stream, current value first.
    pub fn series_stream(&self) -> WatchStream<SeriesSnapshot> {
        WatchStream::new(self.series_rx.clone())
    }

    /// Funnel for every range movement; see [`RangeUpdate`].
    pub fn apply_range_update(&self, update: RangeUpdate) {
        self.shared.apply_range_update(update);
    }

    /// The user picked new bounds in the panel's own range picker.
    pub fn select_range(&self, start: i64, end: i64) {
        if end <= start {
            warn!(target = "panel", start, end, "ignoring empty range selection");
            return;
        }
        self.apply_range_update(RangeUpdate {
            source: UpdateSource::Internal,
            range: QueryRange::new(start, end),
        });
    }

    /// The embedding page pushed a complete range, step included.
    pub fn apply_external_range(&self, range: QueryRange) {
        self.apply_range_update(RangeUpdate {
            source: UpdateSource::External,
            range,
        });
    }

    /// Replace the label filter; the next cycle queries with it.
    pub fn set_filter(&self, filter: MetricLabelFilter) {
        self.shared.snap_tx.send_modify(|snap| {
            if snap.filter == filter {
                return;
            }
            snap.filter = filter;
            snap.one_shot = false;
            snap.revision += 1;
        });
    }

    /// Point the panel at a different scope. Its catalog is listed on the
    /// next cycle, first use or after a reload; a cached listing failure is
    /// dropped on entry, so coming back to a scope that failed retries it.
    pub fn set_scope(&self, scope: impl Into<String>) {
        let scope = scope.into();
        let current = self.shared.snap_tx.borrow().scope.clone();
        if current == scope {
            return;
        }
        self.fanout.forget_failure(&scope);
        self.shared.snap_tx.send_modify(|snap| {
            snap.scope = scope;
            snap.one_shot = false;
            snap.revision += 1;
        });
    }

    /// Drop the cached catalog for the current scope and query again.
    pub fn reload_catalog(&self) {
        let scope = self.shared.snap_tx.borrow().scope.clone();
        self.fanout.reload_catalog(&scope);
        self.shared.snap_tx.send_modify(|snap| {
            snap.one_shot = false;
            snap.revision += 1;
        });
    }

    /// Select the auto-refresh cadence.
    ///
    /// Entering polling immediately slides the window to end now and
    /// queries, then keeps sliding every `f` seconds. Turning polling off
    /// stops the schedule and leaves the last computed range standing.
    pub async fn select_refresh(&self, mode: RefreshMode) {
        let mut schedule = self.schedule.lock().await;
        if let Some(previous) = schedule.take() {
            previous.stop();
        }
        match mode.frequency_secs() {
            None => {
                if matches!(mode, RefreshMode::Every(_)) {
                    warn!(target = "panel", "zero-second refresh requested, treating as off");
                }
                self.shared
                    .snap_tx
                    .send_modify(|snap| snap.refresh = RefreshMode::Off);
            }
            Some(frequency) => {
                let now = Utc::now().timestamp();
                self.shared.snap_tx.send_modify(|snap| {
                    snap.refresh = mode;
                    snap.range = snap.range.slide_to(now);
                    snap.one_shot = false;
                    snap.revision += 1;
                });
                let shared = Arc::clone(&self.shared);
                *schedule = Some(RefreshSchedule::start(frequency, move || shared.tick()));
            }
        }
    }

    /// Manual one-shot refresh: reset the window to the last hour ending
    /// now, whatever was selected before, and query on the waiting path.
    pub fn refresh_now(&self) {
        let now = Utc::now().timestamp();
        self.shared.snap_tx.send_modify(|snap| {
            snap.range = QueryRange::last(DEFAULT_WINDOW_SECS, now);
            snap.one_shot = true;
            snap.revision += 1;
        });
    }

    /// Stop the poller and any schedule. The panel cannot be restarted.
    pub async fn close(&self) {
        if let Some(schedule) = self.schedule.lock().await.take() {
            schedule.stop();
        }
        self.cancel.cancel();
        if let Some(handle) = self.poller.lock().await.take() {
            let _ = handle.await;
        }
        info!(target = "panel", "panel closed");
    }
}

/// One task per panel: launch a fan-out cycle for every query-affecting
/// snapshot change. Cycles run as their own tasks and may overlap; the
/// per-group request slots arbitrate between them, so a fast group keeps
/// its cadence while a slow neighbor waits out its own fetch. Publication
/// is newest-revision-wins: a stale cycle landing late never overwrites a
/// fresher answer.
fn spawn_poller(
    shared: Arc<PanelShared>,
    fanout: Arc<MetricFanOut>,
    series_tx: watch::Sender<SeriesSnapshot>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = shared.snap_tx.subscribe();
        let mut last_launched: Option<u64> = None;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let snap = rx.borrow_and_update().clone();
            if last_launched != Some(snap.revision) {
                last_launched = Some(snap.revision);
                let fanout = Arc::clone(&fanout);
                let series_tx = series_tx.clone();
                tokio::spawn(async move {
                    let answer = if snap.one_shot {
                        fanout
                            .poll_forced(&snap.scope, &snap.filter, snap.range)
                            .await
                    } else {
                        fanout.poll(&snap.scope, &snap.filter, snap.range).await
                    };
                    let update = match answer {
                        Ok(groups) => SeriesSnapshot {
                            revision: snap.revision,
                            groups,
                            error: None,
                        },
                        Err(err) => SeriesSnapshot {
                            revision: snap.revision,
                            groups: Vec::new(),
                            error: Some(err.to_string()),
                        },
                    };
                    series_tx.send_if_modified(|current| {
                        if update.revision < current.revision {
                            return false;
                        }
                        *current = update;
                        true
                    });
                });
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    })
}
