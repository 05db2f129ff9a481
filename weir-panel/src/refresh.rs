use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Refresh cadences offered in the panel menu, in seconds.
pub const REFRESH_FREQUENCIES_SECS: [u64; 5] = [5, 10, 30, 60, 300];

/// Auto-refresh cadence of a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshMode {
    /// No polling; the window only moves on explicit edits.
    Off,
    /// Slide the window and re-query every given number of seconds.
    Every(u64),
}

impl RefreshMode {
    pub fn is_polling(&self) -> bool {
        matches!(self, RefreshMode::Every(secs) if *secs > 0)
    }

    pub fn frequency_secs(&self) -> Option<u64> {
        match self {
            RefreshMode::Every(secs) if *secs > 0 => Some(*secs),
            _ => None,
        }
    }
}

/// Ticker task behind a polling panel.
///
/// At most one schedule exists per panel; selecting a new cadence stops the
/// previous schedule before starting the next, so ticks from two cadences
/// never interleave.
#[derive(Debug)]
pub(crate) struct RefreshSchedule {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RefreshSchedule {
    /// Spawn the ticker, invoking `on_tick` every `frequency_secs` seconds
    /// until stopped. `frequency_secs` must be greater than zero.
    ///
    /// The caller pushes the first slid window itself when it enters polling
    /// mode, so the immediate first fire of `tokio::time::interval` is
    /// consumed here rather than forwarded.
    pub(crate) fn start<F>(frequency_secs: u64, on_tick: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(frequency_secs));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(target = "refresh", frequency_secs, "refresh schedule stopped");
                        break;
                    }
                    _ = ticker.tick() => on_tick(),
                }
            }
        });
        Self { cancel, handle }
    }

    pub(crate) fn stop(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}
