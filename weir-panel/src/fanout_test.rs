#[cfg(test)]
mod tests {
    use crate::errors::PanelError;
    use crate::fanout::{GroupOutcome, GroupResult, MetricFanOut};
    use std::sync::Arc;
    use std::time::Duration;
    use weir_core::{InMemoryBackend, MetricGroup, MetricLabelFilter, QueryRange};

    fn seeded_backend() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend.put_catalog(
            "host",
            vec![
                MetricGroup::new("cpu", "CPU").with_metric("cpu_usage", "%"),
                MetricGroup::new("mem", "Memory").with_metric("mem_used", "MB"),
            ],
        );
        backend.put_series("cpu_usage", &[], vec![(100, 10.0), (200, 20.0)]);
        backend.put_series("mem_used", &[], vec![(100, 512.0), (200, 700.0)]);
        backend
    }

    fn fanout_over(backend: &InMemoryBackend) -> Arc<MetricFanOut> {
        Arc::new(MetricFanOut::new(
            Arc::new(backend.clone()),
            Vec::new(),
            Duration::from_secs(5),
        ))
    }

    fn result_for<'a>(outcomes: &'a [GroupOutcome], key: &str) -> &'a GroupResult {
        &outcomes
            .iter()
            .find(|outcome| outcome.group_key == key)
            .expect("group present in outcomes")
            .result
    }

    /// Test: a slow group drops its own cycles, neighbors keep refreshing
    ///
    /// Purpose
    /// - Validate per-group slot independence: while the CPU group's request
    ///   is still in flight, a new cycle skips CPU but serves Memory fresh
    ///
    /// Expected
    /// - Second cycle: cpu Skipped, mem Series
    /// - First cycle eventually completes with series for both
    /// - The catalog was listed exactly once across both cycles
    #[tokio::test]
    async fn test_slow_group_does_not_block_neighbors() {
        let backend = seeded_backend();
        backend.delay("cpu_usage", Duration::from_millis(300));
        let fanout = fanout_over(&backend);
        let range = QueryRange::new(0, 600);

        let first = {
            let fanout = Arc::clone(&fanout);
            tokio::spawn(async move {
                fanout.poll("host", &MetricLabelFilter::new(), range).await
            })
        };

        // first cycle is now waiting on cpu_usage
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = fanout
            .poll("host", &MetricLabelFilter::new(), range)
            .await
            .expect("second cycle");

        assert!(matches!(result_for(&second, "cpu"), GroupResult::Skipped));
        match result_for(&second, "mem") {
            GroupResult::Series(group) => assert_eq!(group.series.len(), 1),
            other => panic!("expected fresh memory series, got {:?}", other),
        }

        let first = first.await.expect("join").expect("first cycle");
        assert!(matches!(result_for(&first, "cpu"), GroupResult::Series(_)));
        assert!(matches!(result_for(&first, "mem"), GroupResult::Series(_)));

        assert_eq!(backend.catalog_calls(), 1);
    }

    /// Test: scopes reusing a group name do not share a request slot
    ///
    /// Purpose
    /// - Validate that slots are keyed per scope: a slow "cpu" group in one
    ///   scope must not make another scope's "cpu" group skip
    ///
    /// Expected
    /// - While the host cpu fetch is in flight, a cluster cycle still
    ///   answers its cpu group with Series
    #[tokio::test]
    async fn test_group_slots_are_scoped() {
        let backend = InMemoryBackend::new();
        backend.put_catalog(
            "host",
            vec![MetricGroup::new("cpu", "CPU").with_metric("host_cpu", "%")],
        );
        backend.put_catalog(
            "cluster",
            vec![MetricGroup::new("cpu", "CPU").with_metric("cluster_cpu", "%")],
        );
        backend.put_series("host_cpu", &[], vec![(100, 10.0)]);
        backend.put_series("cluster_cpu", &[], vec![(100, 60.0)]);
        backend.delay("host_cpu", Duration::from_millis(300));
        let fanout = fanout_over(&backend);
        let range = QueryRange::new(0, 600);

        let host = {
            let fanout = Arc::clone(&fanout);
            tokio::spawn(async move {
                fanout.poll("host", &MetricLabelFilter::new(), range).await
            })
        };

        // the host cpu slot is now held; the cluster cpu slot must not be
        tokio::time::sleep(Duration::from_millis(50)).await;
        let cluster = fanout
            .poll("cluster", &MetricLabelFilter::new(), range)
            .await
            .expect("cluster cycle");
        assert!(matches!(result_for(&cluster, "cpu"), GroupResult::Series(_)));

        let host = host.await.expect("join").expect("host cycle");
        assert!(matches!(result_for(&host, "cpu"), GroupResult::Series(_)));
    }

    /// Test: a failing group reports its error without touching neighbors
    ///
    /// Expected
    /// - Failing cycle: mem Failed with the backend message, cpu Series
    /// - After the fault clears, the next cycle backfills mem
    #[tokio::test]
    async fn test_group_failure_stays_local() {
        let backend = seeded_backend();
        backend.fail("mem_used", "scrape exploded");
        let fanout = fanout_over(&backend);
        let range = QueryRange::new(0, 600);

        let outcomes = fanout
            .poll("host", &MetricLabelFilter::new(), range)
            .await
            .expect("cycle");
        assert!(matches!(result_for(&outcomes, "cpu"), GroupResult::Series(_)));
        match result_for(&outcomes, "mem") {
            GroupResult::Failed(message) => assert!(message.contains("scrape exploded")),
            other => panic!("expected failed memory group, got {:?}", other),
        }

        backend.heal("mem_used");
        let outcomes = fanout
            .poll("host", &MetricLabelFilter::new(), range)
            .await
            .expect("cycle");
        assert!(matches!(result_for(&outcomes, "mem"), GroupResult::Series(_)));
    }

    /// Test: catalog failure is the only cycle-level error and is cached
    ///
    /// Purpose
    /// - Validate that a broken scope fails the cycle once, is not re-listed
    ///   on every tick, and recovers through an explicit reload
    ///
    /// Expected
    /// - Both cycles error with Catalog; the backend saw one listing
    /// - After heal plus reload, the cycle succeeds and the backend saw a
    ///   second listing
    #[tokio::test]
    async fn test_catalog_failure_cached_until_reload() {
        let backend = seeded_backend();
        backend.fail_catalog("host", "management api down");
        let fanout = fanout_over(&backend);
        let range = QueryRange::new(0, 600);

        let err = fanout
            .poll("host", &MetricLabelFilter::new(), range)
            .await
            .expect_err("catalog is down");
        assert!(matches!(err, PanelError::Catalog { .. }));
        assert!(err.to_string().contains("management api down"));

        let err = fanout
            .poll("host", &MetricLabelFilter::new(), range)
            .await
            .expect_err("failure is cached");
        assert!(matches!(err, PanelError::Catalog { .. }));
        assert_eq!(backend.catalog_calls(), 1);

        backend.heal("host");
        fanout.reload_catalog("host");
        let outcomes = fanout
            .poll("host", &MetricLabelFilter::new(), range)
            .await
            .expect("cycle after reload");
        assert_eq!(outcomes.len(), 2);
        assert_eq!(backend.catalog_calls(), 2);
    }

    /// Test: forgetting a failure retries the listing, healthy caches stay
    ///
    /// Expected
    /// - A forgotten failed scope is re-listed on the next cycle
    /// - Forgetting a scope with a healthy cached catalog re-lists nothing
    #[tokio::test]
    async fn test_forget_failure_drops_only_failures() {
        let backend = seeded_backend();
        backend.fail_catalog("edge", "management api down");
        let fanout = fanout_over(&backend);
        let range = QueryRange::new(0, 600);

        fanout
            .poll("host", &MetricLabelFilter::new(), range)
            .await
            .expect("healthy scope");
        fanout
            .poll("edge", &MetricLabelFilter::new(), range)
            .await
            .expect_err("broken scope");
        assert_eq!(backend.catalog_calls(), 2);

        backend.heal("edge");
        fanout.forget_failure("edge");
        fanout.forget_failure("host");

        let outcomes = fanout
            .poll("edge", &MetricLabelFilter::new(), range)
            .await
            .expect("retried after forget");
        assert!(outcomes.is_empty());
        fanout
            .poll("host", &MetricLabelFilter::new(), range)
            .await
            .expect("cached scope");
        // edge re-listed once; the healthy host cache was untouched
        assert_eq!(backend.catalog_calls(), 3);
    }

    /// Test: a forced cycle waits out in-flight requests
    ///
    /// Expected
    /// - While a polling cycle holds the cpu slot, a forced cycle still
    ///   comes back with cpu Series, not Skipped
    #[tokio::test]
    async fn test_forced_cycle_never_skips() {
        let backend = seeded_backend();
        backend.delay("cpu_usage", Duration::from_millis(200));
        let fanout = fanout_over(&backend);
        let range = QueryRange::new(0, 600);

        let first = {
            let fanout = Arc::clone(&fanout);
            tokio::spawn(async move {
                fanout.poll("host", &MetricLabelFilter::new(), range).await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        let forced = fanout
            .poll_forced("host", &MetricLabelFilter::new(), range)
            .await
            .expect("forced cycle");
        assert!(matches!(result_for(&forced, "cpu"), GroupResult::Series(_)));

        first.await.expect("join").expect("first cycle");
    }

    /// Test: group labels flow into legends
    ///
    /// Expected
    /// - Two hosts answering one metric stay distinct lines, legended by
    ///   the host label
    #[tokio::test]
    async fn test_group_labels_keep_entities_distinct() {
        let backend = InMemoryBackend::new();
        backend.put_catalog(
            "host",
            vec![MetricGroup::new("cpu", "CPU").with_metric("cpu_usage", "%")],
        );
        backend.put_series("cpu_usage", &[("host", "a")], vec![(100, 1.0)]);
        backend.put_series("cpu_usage", &[("host", "b")], vec![(100, 2.0)]);

        let fanout = MetricFanOut::new(
            Arc::new(backend.clone()),
            vec!["host".to_string()],
            Duration::from_secs(5),
        );
        let outcomes = fanout
            .poll("host", &MetricLabelFilter::new(), QueryRange::new(0, 600))
            .await
            .expect("cycle");

        match result_for(&outcomes, "cpu") {
            GroupResult::Series(group) => {
                let mut legends: Vec<_> =
                    group.series.iter().map(|s| s.legend.clone()).collect();
                legends.sort();
                assert_eq!(legends, vec!["cpu_usage{host=a}", "cpu_usage{host=b}"]);
            }
            other => panic!("expected series, got {:?}", other),
        }
    }
}
