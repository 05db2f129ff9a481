use serde::{Deserialize, Serialize};

/// Number of samples a chart renders for one query window.
pub const DEFAULT_POINT_COUNT: i64 = 15;

/// Window length used when no explicit range was supplied, in seconds.
pub const DEFAULT_WINDOW_SECS: i64 = 3600;

/// Resolution step for a query window, in seconds.
///
/// Ceil division keeps the trailing partial bucket: an 1801 second window at
/// 15 points must query with step 121, not 120, otherwise the last sample
/// would fall outside the window.
pub fn compute_step(start: i64, end: i64, point_count: i64) -> i64 {
    let span = end - start;
    (span + point_count - 1) / point_count
}

/// One resolved query window: unix second bounds plus the sampling step that
/// every range query issued for the window shares.
///
/// Callers keep `end > start`; the step is derived and stays `>= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryRange {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

impl QueryRange {
    /// Range over `[start, end]` with the step derived for the default
    /// point count.
    pub fn new(start: i64, end: i64) -> Self {
        Self::with_point_count(start, end, DEFAULT_POINT_COUNT)
    }

    /// Range over `[start, end]` sampled at `point_count` points.
    pub fn with_point_count(start: i64, end: i64, point_count: i64) -> Self {
        Self {
            start,
            end,
            step: compute_step(start, end, point_count),
        }
    }

    /// The last `window_secs` seconds ending at `now`.
    pub fn last(window_secs: i64, now: i64) -> Self {
        Self::new(now - window_secs, now)
    }

    /// Window length in seconds.
    pub fn duration(&self) -> i64 {
        self.end - self.start
    }

    /// The same window length re-anchored to end at `now`, with the step
    /// derived again from the bounds. For a window whose step was already
    /// derived this comes out unchanged, since the duration is preserved;
    /// a hand-set step is superseded by the first slide.
    pub fn slide_to(&self, now: i64) -> Self {
        Self::new(now - self.duration(), now)
    }
}
