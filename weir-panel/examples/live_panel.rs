use anyhow::Result;
use std::sync::Arc;
use tokio_stream::StreamExt;
use weir_core::{InMemoryBackend, MetricGroup, MetricLabelFilter};
use weir_panel::{FilterRangePanel, GroupResult, PanelOptions, RefreshMode};

// Drives a panel over a seeded in-memory backend: two hosts report cpu and
// memory samples for the past hour, the panel polls every 2 seconds, then
// the view narrows to one host.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let now = chrono::Utc::now().timestamp();
    let backend = InMemoryBackend::new();
    backend.put_catalog(
        "host",
        vec![
            MetricGroup::new("cpu", "CPU").with_metric("cpu_usage", "%"),
            MetricGroup::new("mem", "Memory").with_metric("mem_used", "MB"),
        ],
    );
    for host in ["10.0.0.12", "10.0.0.13"] {
        let points: Vec<(i64, f64)> = (0..60)
            .map(|i| (now - 3600 + i * 60, 20.0 + (i % 7) as f64))
            .collect();
        backend.put_series("cpu_usage", &[("host", host)], points);
    }
    let mem_points: Vec<(i64, f64)> = (0..60)
        .map(|i| (now - 3600 + i * 60, 512.0 + i as f64))
        .collect();
    backend.put_series("mem_used", &[("host", "10.0.0.12")], mem_points);

    let panel = FilterRangePanel::start(
        PanelOptions {
            scope: "host".to_string(),
            group_labels: vec!["host".to_string()],
            initial_refresh: RefreshMode::Every(2),
            ..Default::default()
        },
        Arc::new(backend),
    )
    .await;

    let mut series = panel.series_stream();
    let mut cycles = 0;
    while let Some(snapshot) = series.next().await {
        if snapshot.revision == 0 {
            // seed value published before the first cycle ran
            continue;
        }
        let range = panel.current_range();
        println!(
            "cycle {} window [{}..{}] step {}s",
            snapshot.revision, range.start, range.end, range.step
        );
        for group in &snapshot.groups {
            match &group.result {
                GroupResult::Series(group_series) => {
                    for line in &group_series.series {
                        println!(
                            "  {:>6} {:32} {:2} points ({})",
                            group.group_key,
                            line.legend,
                            line.points.len(),
                            line.unit
                        );
                    }
                }
                GroupResult::Skipped => {
                    println!("  {:>6} skipped, previous request in flight", group.group_key)
                }
                GroupResult::Failed(err) => println!("  {:>6} failed: {}", group.group_key, err),
            }
        }

        cycles += 1;
        if cycles == 3 {
            println!("narrowing to host 10.0.0.12");
            panel.set_filter(MetricLabelFilter::new().with("host", "10.0.0.12"));
        }
        if cycles == 6 {
            break;
        }
    }

    panel.close().await;
    println!("panel closed");
    Ok(())
}
