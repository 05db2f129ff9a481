//! Weir-core
//!
//! Core vocabulary of the Weir monitoring panel engine: query windows with
//! their derived resolution steps, label filters, metric catalogs, series
//! shapes, and the backend contract the engine queries through. The
//! in-memory backend lives here too so every crate tests against the same
//! programmable double.

pub mod backend;
pub mod catalog;
pub mod filter;
pub mod range;
pub mod series;

pub use backend::in_memory::InMemoryBackend;
pub use backend::{BackendError, MetricsBackend, RangeQuery};
pub use catalog::{MetricDescriptor, MetricGroup};
pub use filter::{Label, MetricLabelFilter};
pub use range::{compute_step, QueryRange, DEFAULT_POINT_COUNT, DEFAULT_WINDOW_SECS};
pub use series::{legend_for, GroupSeries, MetricSeries, SeriesPoint};
