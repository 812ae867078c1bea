// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "metrics")]
use opentelemetry::metrics::MeterProvider;
use tick::Clock;
use uuid::Uuid;

use crate::alert::Alert;
use crate::analytics::{AnalyticsEvent, AnalyticsSink};
use crate::background::BackgroundTasks;
use crate::config::MonitorConfig;
use crate::error::ConfigError;
use crate::evaluator::ThresholdEvaluator;
use crate::observer::SubscriptionId;
use crate::record::{CustomMetric, ErrorRecord, RequestMetadata, RequestRecord, ResponseInfo, SystemSample};
use crate::sampler::{SysinfoProbe, ResourceProbe, SystemSampler};
use crate::store::MetricsStore;
use crate::summary::MetricsSummary;
use crate::telemetry::MonitorTelemetry;
use crate::tracker::RequestTracker;

/// Custom metric counting requests dropped by the orphan sweep.
pub const ORPHANED_REQUESTS: &str = "orphaned_requests";

/// Error type recorded for requests that end with a 5xx status.
pub const SERVER_ERROR: &str = "server_error";

#[derive(Debug)]
struct MonitorInner {
    clock: Clock,
    config: MonitorConfig,
    store: MetricsStore,
    tracker: RequestTracker,
    evaluator: ThresholdEvaluator,
    sampler: SystemSampler,
    analytics: Option<Arc<dyn AnalyticsSink>>,
    telemetry: MonitorTelemetry,
}

/// Request tracking, metric storage and alerting behind one handle.
///
/// Cloning is cheap; clones share all state. Construct one per process and
/// hand clones to every consumer.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use strata_monitor::{PerformanceMonitor, RequestMetadata, ResponseInfo};
/// use tick::Clock;
///
/// # fn example(clock: &Clock) -> Result<(), strata_monitor::ConfigError> {
/// let monitor = PerformanceMonitor::builder(clock).build()?;
///
/// let id = monitor.start_request(None, RequestMetadata::new().path("/donors"));
/// monitor.mark_request(&id, "query", None);
/// monitor.end_request(&id, ResponseInfo::status(200));
///
/// let summary = monitor.summarize(Duration::from_secs(300));
/// assert_eq!(summary.request_count, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    inner: Arc<MonitorInner>,
}

impl PerformanceMonitor {
    /// Starts building a monitor.
    #[must_use]
    pub fn builder(clock: &Clock) -> PerformanceMonitorBuilder {
        PerformanceMonitorBuilder::new(clock)
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// The clock driving this monitor.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    /// The underlying metric storage.
    #[must_use]
    pub fn store(&self) -> &MetricsStore {
        &self.inner.store
    }

    /// The open-request table.
    #[must_use]
    pub fn tracker(&self) -> &RequestTracker {
        &self.inner.tracker
    }

    /// The alert evaluator.
    #[must_use]
    pub fn evaluator(&self) -> &ThresholdEvaluator {
        &self.inner.evaluator
    }

    /// Opens a request; see [`RequestTracker::start`].
    pub fn start_request(&self, id: Option<String>, metadata: RequestMetadata) -> String {
        self.inner.tracker.start(id, metadata)
    }

    /// Marks a phase; see [`RequestTracker::mark`].
    pub fn mark_request(&self, id: &str, phase: &str, metadata: Option<BTreeMap<String, String>>) {
        self.inner.tracker.mark(id, phase, metadata);
    }

    /// Closes a request, stores it and evaluates the request rules.
    ///
    /// Responses with a 5xx status also store an error record. Returns the
    /// finalized record, or `None` if `id` was not open.
    pub fn end_request(&self, id: &str, response: ResponseInfo) -> Option<RequestRecord> {
        let record = self.inner.tracker.end(id, response)?;

        self.inner.store.record_request(record.clone());
        if let Some(code) = record.status_code()
            && record.is_server_error()
        {
            let mut error = ErrorRecord::new(SERVER_ERROR, format!("request ended with status {code}")).request_id(id);
            if let Some(path) = &record.metadata.path {
                error = error.context("path", path.clone());
            }
            self.inner.store.record_error(error);
        }

        self.inner.telemetry.record_request(&record);
        tracing::debug!(
            request.id = id,
            request.duration_ms = record.duration.as_millis(),
            request.status = record.status_code(),
            "request.completed"
        );

        let _ = self.inner.evaluator.evaluate_request(&record, &self.inner.store);

        if let Some(sink) = &self.inner.analytics {
            sink.send(AnalyticsEvent::Request(record.clone()));
        }

        Some(record)
    }

    /// Stores an application error.
    pub fn record_error(&self, error: ErrorRecord) {
        tracing::debug!(error.kind = error.error_type.as_str(), "error.recorded");
        self.inner.store.record_error(error);
    }

    /// Stores a named value and forwards it to analytics.
    pub fn record_custom(&self, name: impl Into<String>, value: f64, tags: BTreeMap<String, String>) {
        let name = name.into();
        if let Some(sink) = &self.inner.analytics {
            sink.send(AnalyticsEvent::Custom(CustomMetric {
                name: name.clone(),
                value,
                tags: tags.clone(),
            }));
        }
        self.inner.store.record_custom(name, value, tags);
    }

    /// Stores a resource sample and evaluates the resource rules.
    pub fn record_system_sample(&self, sample: SystemSample) {
        let _ = self.inner.evaluator.evaluate_sample(&sample);
        self.inner.store.record_system_sample(sample);
    }

    /// Takes a resource sample, stores it and returns it.
    pub async fn sample_system(&self) -> SystemSample {
        let sample = self.inner.sampler.sample().await;
        self.record_system_sample(sample.clone());
        sample
    }

    /// Drops requests open longer than the configured maximum age.
    ///
    /// Dropped requests are counted under [`ORPHANED_REQUESTS`].
    pub fn sweep_orphans(&self) -> usize {
        let dropped = self.inner.tracker.sweep_orphans(self.inner.config.max_request_age());
        if dropped > 0 {
            #[expect(clippy::cast_precision_loss, reason = "orphan counts are small")]
            let value = dropped as f64;
            self.record_custom(ORPHANED_REQUESTS, value, BTreeMap::new());
        }
        dropped
    }

    /// Drops metrics older than the retention window.
    pub fn prune(&self) -> usize {
        self.inner.store.prune()
    }

    /// Aggregates the last `window` of metrics.
    #[must_use]
    pub fn summarize(&self, window: Duration) -> MetricsSummary {
        self.inner.store.summarize(window)
    }

    /// Registers an alert callback.
    pub fn subscribe_alerts(&self, listener: impl Fn(&Alert) + Send + Sync + 'static) -> SubscriptionId {
        self.inner.evaluator.subscribe(listener)
    }

    /// Removes an alert callback.
    pub fn unsubscribe_alerts(&self, id: SubscriptionId) -> bool {
        self.inner.evaluator.unsubscribe(id)
    }

    /// Up to `limit` alerts, newest first.
    #[must_use]
    pub fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        self.inner.evaluator.recent_alerts(limit)
    }

    /// Acknowledges an alert.
    pub fn acknowledge_alert(&self, id: Uuid) -> bool {
        self.inner.evaluator.acknowledge(id)
    }

    /// Alerts raised during the last `window`.
    #[must_use]
    pub fn alert_count(&self, window: Duration) -> usize {
        self.inner.evaluator.alert_count(window)
    }

    /// Spawns the sampler, pruner and orphan sweep on the ambient Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use = "dropping the handle stops the tasks"]
    pub fn start_background(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();
        let clock = &self.inner.clock;
        let config = &self.inner.config;

        let monitor = self.clone();
        tasks.spawn_periodic("system_sampler", clock, config.sampling_interval(), move || {
            let monitor = monitor.clone();
            async move {
                let _ = monitor.sample_system().await;
            }
        });

        let monitor = self.clone();
        tasks.spawn_periodic("metrics_prune", clock, config.prune_interval(), move || {
            monitor.prune();
            async {}
        });

        let monitor = self.clone();
        tasks.spawn_periodic("orphan_sweep", clock, config.orphan_sweep_interval(), move || {
            monitor.sweep_orphans();
            async {}
        });

        tasks
    }
}

/// Builds a [`PerformanceMonitor`].
#[derive(Debug)]
pub struct PerformanceMonitorBuilder {
    clock: Clock,
    config: MonitorConfig,
    probe: Option<Arc<dyn ResourceProbe>>,
    analytics: Option<Arc<dyn AnalyticsSink>>,
    telemetry: MonitorTelemetry,
}

impl PerformanceMonitorBuilder {
    fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            config: MonitorConfig::default(),
            probe: None,
            analytics: None,
            telemetry: MonitorTelemetry::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `probe` instead of [`SysinfoProbe`].
    #[must_use]
    pub fn probe(mut self, probe: impl ResourceProbe + 'static) -> Self {
        self.probe = Some(Arc::new(probe));
        self
    }

    /// Forwards finalized records and custom metrics to `sink`.
    #[must_use]
    pub fn analytics(mut self, sink: impl AnalyticsSink + 'static) -> Self {
        self.analytics = Some(Arc::new(sink));
        self
    }

    /// Records alert counts and request durations through `provider`.
    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn meter_provider(mut self, provider: &dyn MeterProvider) -> Self {
        self.telemetry = MonitorTelemetry::new(provider);
        self
    }

    /// Validates the configuration and builds the monitor.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid.
    pub fn build(self) -> Result<PerformanceMonitor, ConfigError> {
        self.config.validate()?;

        let probe = self.probe.unwrap_or_else(|| Arc::new(SysinfoProbe::new()));
        let config = self.config;

        Ok(PerformanceMonitor {
            inner: Arc::new(MonitorInner {
                store: MetricsStore::new(&self.clock, config.retention()).with_top_paths(config.top_paths),
                tracker: RequestTracker::new(&self.clock),
                evaluator: ThresholdEvaluator::new(
                    &self.clock,
                    config.thresholds.clone(),
                    config.error_rate_window(),
                    config.alert_cooldown(),
                    config.alert_log_capacity,
                    self.telemetry.clone(),
                ),
                sampler: SystemSampler::new(&self.clock, probe, config.cpu_window()),
                analytics: self.analytics,
                telemetry: self.telemetry,
                clock: self.clock,
                config,
            }),
        })
    }
}
