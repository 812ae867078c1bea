// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The cache and the monitor wired together.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::executor::block_on;
use strata::{CacheOptions, ConfigError, HealthStatus, Strata, StrataConfig, TierKind};
use strata_distributed::testing::{InMemoryStore, StoreOp};
use strata_monitor::{AlertKind, ErrorRecord, RequestMetadata, ResponseInfo};
use tick::ClockControl;

type TestResult = Result<(), ConfigError>;

fn two_tier_config() -> StrataConfig {
    StrataConfig::from_toml_str(
        r#"
        [cache]
        default_ttl_secs = 60

        [[cache.strategies]]
        name = "donor-list"
        key_pattern = "donor-list"
        ttl_secs = 300
        tiers = ["memory", "distributed"]

        [monitor.thresholds]
        response_time_ms = 1000
        error_rate = 0.05
        "#,
    )
    .expect("valid config")
}

#[test]
fn request_with_cached_lookup_end_to_end() -> TestResult {
    let control = ClockControl::new();
    let store = InMemoryStore::new();
    let strata = Strata::builder(&control.to_clock())
        .config(two_tier_config())
        .distributed_store(store.clone())
        .build()?;
    let options = CacheOptions::new().strategy("donor-list");

    block_on(async {
        let id = strata.track_request_start(None, RequestMetadata::new().method("GET").path("/donors"));

        let cached: Option<Vec<u32>> = strata.cache_get("donor-list:region=NG", &options).await;
        assert!(cached.is_none());
        strata.track_request_mark(&id, "db_query", None);
        strata
            .cache_set("donor-list:region=NG", &[1_u32, 2, 3], &options)
            .await
            .expect("encodes");

        control.advance(Duration::from_millis(40));
        let record = strata.track_request_end(&id, ResponseInfo::status(200)).expect("open request");
        assert_eq!(record.duration, Duration::from_millis(40));

        store.clear_operations();
        let cached: Option<Vec<u32>> = strata.cache_get("donor-list:region=NG", &options).await;
        assert_eq!(cached, Some(vec![1, 2, 3]));
        assert_eq!(store.count(|op| matches!(op, StoreOp::Get(_))), 0);
    });

    let summary = strata.monitor().summarize(Duration::from_secs(300));
    assert_eq!(summary.request_count, 1);
    assert_eq!(summary.custom_count("cache_miss"), 2);
    assert_eq!(summary.custom_count("cache_set"), 2);
    assert_eq!(summary.custom_count("cache_hit"), 1);
    Ok(())
}

#[test]
fn unreachable_distributed_tier_degrades_health() -> TestResult {
    let clock = ClockControl::new().to_clock();
    let store = InMemoryStore::new();
    let strata = Strata::builder(&clock)
        .config(two_tier_config())
        .distributed_store(store.clone())
        .build()?;

    let healthy = block_on(strata.health_snapshot());
    assert_eq!(healthy.status, HealthStatus::Healthy);

    store.fail_when(|_| true);
    let snapshot = block_on(strata.health_snapshot());
    assert_eq!(snapshot.status, HealthStatus::Degraded);
    assert_eq!(
        snapshot.tier_availability,
        vec![(TierKind::Memory, true), (TierKind::Distributed, false)]
    );

    // The memory tier keeps serving.
    block_on(async {
        let options = CacheOptions::new().strategy("donor-list");
        let report = strata.cache_set("donor-list:region=KE", &"cached", &options).await.expect("encodes");
        assert_eq!(report.succeeded(TierKind::Distributed), Some(false));
        let value: Option<String> = strata.cache_get("donor-list:region=KE", &options).await;
        assert_eq!(value.as_deref(), Some("cached"));
    });
    Ok(())
}

#[test]
fn high_error_rate_degrades_health_and_alerts() -> TestResult {
    let control = ClockControl::new();
    let strata = Strata::builder(&control.to_clock()).build()?;

    let alerts = Arc::new(AtomicUsize::new(0));
    {
        let alerts = Arc::clone(&alerts);
        strata.subscribe_alerts(move |alert| {
            if alert.kind == AlertKind::HighErrorRate {
                alerts.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    for status in [200, 500, 500, 200] {
        let id = strata.track_request_start(None, RequestMetadata::new().path("/donors"));
        strata.track_request_end(&id, ResponseInfo::status(status));
    }
    strata.record_error(ErrorRecord::new("timeout", "upstream timed out"));

    let snapshot = block_on(strata.health_snapshot());
    assert_eq!(snapshot.status, HealthStatus::Degraded);
    assert_eq!(snapshot.summary.request_count, 4);
    assert!(snapshot.recent_alert_count >= 1);
    assert!(alerts.load(Ordering::Relaxed) >= 1);
    Ok(())
}

#[cfg(feature = "metrics")]
#[test]
fn cache_events_reach_logs_and_metrics() -> TestResult {
    use opentelemetry::KeyValue;
    use strata_monitor::testing::{LogCapture, MetricTester};

    let capture = LogCapture::new();
    let _guard = tracing::subscriber::set_default(capture.subscriber());
    let tester = MetricTester::new();

    let clock = ClockControl::new().to_clock();
    let strata = Strata::builder(&clock).meter_provider(tester.meter_provider()).build()?;

    block_on(async {
        strata.cache_set("session:1", &"alice", &CacheOptions::new()).await.expect("encodes");
        let _: Option<String> = strata.cache_get("session:1", &CacheOptions::new()).await;
    });

    capture.assert_contains("cache.event");
    capture.assert_contains("cache.hit");
    tester.assert_attributes_contain(&[
        KeyValue::new("cache.tier", "memory"),
        KeyValue::new("cache.activity", "cache.hit"),
        KeyValue::new("cache.activity", "cache.inserted"),
    ]);
    Ok(())
}

#[test]
fn dependency_invalidation_through_the_facade() -> TestResult {
    let clock = ClockControl::new().to_clock();
    let store = InMemoryStore::new();
    let strata = Strata::builder(&clock)
        .config(two_tier_config())
        .distributed_store(store.clone())
        .build()?;

    block_on(async {
        let options = CacheOptions::new().depends_on("donor:42");
        strata.cache_set("donor-list:region=NG", &[42], &options).await.expect("encodes");
        strata.cache_set("leaderboard:weekly", &[42], &options).await.expect("encodes");

        let report = strata.cache_invalidate_dependency("donor:42").await;
        assert_eq!(report.invalidated, 2);

        let gone: Option<Vec<u32>> = strata.cache_get("leaderboard:weekly", &CacheOptions::new()).await;
        assert!(gone.is_none());
        assert!(!store.contains_key("donor-list:region=NG"));
    });

    let summary = strata.monitor().summarize(Duration::from_secs(60));
    assert_eq!(summary.custom_count("cache_delete"), 3);
    Ok(())
}

#[tokio::test]
async fn background_tasks_cover_both_halves() -> TestResult {
    let clock = ClockControl::new().to_clock();
    let strata = Strata::builder(&clock).build()?;

    let tasks = strata.start_background_tasks();
    let names = tasks.names();
    for expected in ["system_sampler", "metrics_prune", "orphan_sweep", "cache_sweep", "dependency_prune"] {
        assert!(names.contains(&expected), "{expected} missing from {names:?}");
    }
    Ok(())
}
