// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! End-to-end tests for request tracking, retention and alerting.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use strata_monitor::{
    AlertKind, ConfigError, ErrorRecord, MetricsStore, MonitorConfig, PerformanceMonitor, RequestMetadata, ResponseInfo, Thresholds,
};
use tick::ClockControl;

type TestResult = Result<(), ConfigError>;

fn latency_only() -> MonitorConfig {
    MonitorConfig {
        thresholds: Thresholds {
            response_time_ms: Some(1_000),
            error_rate: Some(0.05),
            cpu: None,
            memory: None,
        },
        ..MonitorConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_concurrent_requests_half_slow() -> TestResult {
    let control = ClockControl::new();
    let monitor = PerformanceMonitor::builder(&control.to_clock()).config(latency_only()).build()?;

    let slow_alerts = Arc::new(AtomicUsize::new(0));
    {
        let slow_alerts = Arc::clone(&slow_alerts);
        monitor.subscribe_alerts(move |alert| {
            if alert.kind == AlertKind::SlowResponse {
                slow_alerts.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    let starts: Vec<_> = (0..100)
        .map(|i| {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.start_request(Some(format!("req-{i}")), RequestMetadata::new().path("/donors")) })
        })
        .collect();
    for start in starts {
        start.await.expect("start task");
    }
    assert_eq!(monitor.tracker().open_count(), 100);

    let end_batch = |parity: usize| {
        (0..100_usize)
            .filter(move |i| i % 2 == parity)
            .map(|i| {
                let monitor = monitor.clone();
                tokio::spawn(async move { monitor.end_request(&format!("req-{i}"), ResponseInfo::status(200)) })
            })
            .collect::<Vec<_>>()
    };

    control.advance(Duration::from_millis(10));
    for end in end_batch(0) {
        assert!(end.await.expect("end task").is_some());
    }

    control.advance(Duration::from_millis(2_000));
    for end in end_batch(1) {
        assert!(end.await.expect("end task").is_some());
    }

    assert_eq!(monitor.tracker().open_count(), 0);
    assert_eq!(slow_alerts.load(Ordering::Relaxed), 50);

    let logged_slow = monitor
        .recent_alerts(1_000)
        .into_iter()
        .filter(|alert| alert.kind == AlertKind::SlowResponse)
        .count();
    assert_eq!(logged_slow, 50);

    let summary = monitor.summarize(Duration::from_secs(60));
    assert_eq!(summary.request_count, 100);
    let mean = summary.mean_duration.expect("requests recorded");
    assert!(
        (mean.as_secs_f64() - 1.010).abs() < 1e-9,
        "mean duration was {mean:?}"
    );
    assert_eq!(summary.top_paths, vec![("/donors".to_owned(), 100)]);
    Ok(())
}

#[test]
fn slow_alert_carries_actual_duration() -> TestResult {
    let control = ClockControl::new();
    let monitor = PerformanceMonitor::builder(&control.to_clock()).config(latency_only()).build()?;

    let fast = monitor.start_request(None, RequestMetadata::new());
    control.advance(Duration::from_millis(1_000));
    monitor.end_request(&fast, ResponseInfo::status(200));
    assert!(monitor.recent_alerts(10).is_empty());

    let slow = monitor.start_request(None, RequestMetadata::new());
    control.advance(Duration::from_millis(1_234));
    monitor.end_request(&slow, ResponseInfo::status(200));

    let alerts = monitor.recent_alerts(10);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::SlowResponse);
    assert!((alerts[0].actual_value - 1_234.0).abs() < 1e-9);
    assert_eq!(alerts[0].context.get("request_id"), Some(&slow));
    Ok(())
}

#[test]
fn metrics_survive_until_retention_elapses() {
    let control = ClockControl::new();
    let retention = Duration::from_secs(3_600);
    let store = MetricsStore::new(&control.to_clock(), retention);

    control.advance(Duration::from_secs(30));
    store.record_error(ErrorRecord::new("timeout", "upstream"));

    control.advance(retention - Duration::from_secs(1));
    store.prune();
    assert_eq!(store.summarize(retention).error_count, 1);

    control.advance(Duration::from_secs(1));
    store.prune();
    assert_eq!(store.summarize(Duration::from_secs(10_000)).error_count, 0);
    assert!(store.is_empty());
}

#[test]
fn acknowledged_alerts_leave_unacknowledged_count() -> TestResult {
    let control = ClockControl::new();
    let monitor = PerformanceMonitor::builder(&control.to_clock()).config(latency_only()).build()?;

    let id = monitor.start_request(None, RequestMetadata::new());
    monitor.end_request(&id, ResponseInfo::status(500));

    let alerts = monitor.recent_alerts(10);
    let kinds: Vec<_> = alerts.iter().map(|alert| alert.kind).collect();
    assert_eq!(kinds, vec![AlertKind::HighErrorRate, AlertKind::ServerError]);
    assert_eq!(monitor.evaluator().unacknowledged_count(), 2);

    assert!(monitor.acknowledge_alert(alerts[0].id));
    assert_eq!(monitor.evaluator().unacknowledged_count(), 1);
    assert_eq!(monitor.alert_count(Duration::from_secs(60)), 2);
    Ok(())
}
