//! Weir-panel
//!
//! The engine behind a monitoring console page: it owns the query window,
//! label filter and refresh cadence of a panel, guarantees at most one
//! in-flight request per metric group, and fans parallel range queries out
//! across the groups of a scope.
//!
//! The pieces compose bottom-up: [`RequestRunner`] guards one request slot,
//! [`MetricFanOut`] runs one slot per metric group, and
//! [`FilterRangePanel`] drives both from user edits and schedule ticks.

pub mod errors;

mod fanout;
mod http_backend;
mod panel;
mod refresh;
mod runner;

pub use errors::{PanelError, Result};
pub use fanout::{GroupOutcome, GroupResult, MetricFanOut};
pub use http_backend::{HttpBackend, HttpBackendConfig};
pub use panel::{
    FilterRangePanel, PanelOptions, PanelSnapshot, RangeUpdate, SeriesSnapshot, UpdateSource,
};
pub use refresh::{RefreshMode, REFRESH_FREQUENCIES_SECS};
pub use runner::{RequestRunner, RunOutcome, DEFAULT_OP_TIMEOUT};

// Unit tests
#[cfg(test)]
mod fanout_test;
