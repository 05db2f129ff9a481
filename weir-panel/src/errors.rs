use std::time::Duration;
use thiserror::Error;
use weir_core::BackendError;

pub type Result<T> = std::result::Result<T, PanelError>;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("metrics backend error: {0}")]
    Backend(#[from] BackendError),

    /// A guarded query exceeded its ceiling and its slot was force-released.
    #[error("query gave no answer within {0:?}")]
    Timeout(Duration),

    /// The catalog for a scope could not be listed, so the panel has no
    /// groups to draw. Per-group query failures never surface here, they
    /// stay inside their group's outcome.
    #[error("metric catalog unavailable for scope '{scope}': {message}")]
    Catalog { scope: String, message: String },
}
