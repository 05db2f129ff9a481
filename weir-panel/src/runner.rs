use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::{PanelError, Result};

/// Ceiling for one guarded fetch. A backend that never answers would
/// otherwise hold the slot forever and starve every later cycle for its
/// group.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(30);

/// What a guarded invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome<T> {
    /// The slot was free and the operation ran to an answer.
    Completed(T),
    /// The previous request was still in flight; this cycle was dropped,
    /// not queued.
    Skipped,
}

impl<T> RunOutcome<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            RunOutcome::Completed(value) => Some(value),
            RunOutcome::Skipped => None,
        }
    }
}

/// Gate allowing at most one in-flight request per owner.
///
/// Polling cycles take the drop-if-busy path: a tick that finds the slot
/// occupied is discarded outright, since the next tick will query a strictly
/// newer window anyway. One-shot refreshes take the waiting path instead, a
/// manual action must never be silently discarded. Both paths release the
/// slot on success, error and timeout alike.
#[derive(Debug)]
pub struct RequestRunner {
    slot: Mutex<()>,
    op_timeout: Duration,
    dropped_in_row: AtomicU64,
}

impl Default for RequestRunner {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_OP_TIMEOUT)
    }
}

impl RequestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(op_timeout: Duration) -> Self {
        Self {
            slot: Mutex::new(()),
            op_timeout,
            dropped_in_row: AtomicU64::new(0),
        }
    }

    /// Polling path: run `op` if the slot is free, otherwise drop the cycle
    /// and report [`RunOutcome::Skipped`].
    pub async fn run<T, F>(&self, op: F) -> Result<RunOutcome<T>>
    where
        F: Future<Output = Result<T>>,
    {
        let _guard = match self.slot.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                let dropped = self.dropped_in_row.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    target = "request_runner",
                    consecutive = dropped,
                    "request still in flight, polling cycle dropped"
                );
                return Ok(RunOutcome::Skipped);
            }
        };
        self.dropped_in_row.store(0, Ordering::Relaxed);
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map(RunOutcome::Completed),
            Err(_) => Err(PanelError::Timeout(self.op_timeout)),
        }
        // _guard drops here, releasing the slot on every path
    }

    /// One-shot path: wait for the slot instead of dropping, so a manual
    /// refresh runs exactly once no matter what was in flight.
    pub async fn run_forced<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _guard = self.slot.lock().await;
        self.dropped_in_row.store(0, Ordering::Relaxed);
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(PanelError::Timeout(self.op_timeout)),
        }
    }

    /// Whether a request currently occupies the slot.
    pub fn is_busy(&self) -> bool {
        self.slot.try_lock().is_err()
    }

    /// Consecutive polling cycles dropped since the last cycle that ran.
    pub fn dropped_in_row(&self) -> u64 {
        self.dropped_in_row.load(Ordering::Relaxed)
    }
}
