use std::time::{Duration, Instant};
use weir_core::{InMemoryBackend, MetricGroup};

/// Creates a backend with a two-group "host" catalog and samples anchored
/// around `now`, two hosts answering the cpu metric.
pub fn seeded_backend(now: i64) -> InMemoryBackend {
    let backend = InMemoryBackend::new();
    backend.put_catalog(
        "host",
        vec![
            MetricGroup::new("cpu", "CPU").with_metric("cpu_usage", "%"),
            MetricGroup::new("mem", "Memory").with_metric("mem_used", "MB"),
        ],
    );
    backend.put_series(
        "cpu_usage",
        &[("host", "a")],
        vec![(now - 300, 12.0), (now - 200, 14.5), (now - 100, 11.0)],
    );
    backend.put_series(
        "cpu_usage",
        &[("host", "b")],
        vec![(now - 300, 40.0), (now - 200, 38.0), (now - 100, 41.5)],
    );
    backend.put_series(
        "mem_used",
        &[("host", "a")],
        vec![(now - 300, 512.0), (now - 100, 640.0)],
    );
    backend
}

/// Waits for a condition to become true, polling every 50ms until the
/// timeout elapses.
pub async fn wait_for_condition<F, Fut>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
