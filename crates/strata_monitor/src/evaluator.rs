// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tick::Clock;
use uuid::Uuid;

use crate::alert::{Alert, AlertKind, AlertLog};
use crate::config::Thresholds;
use crate::error::EvaluationError;
use crate::observer::{SubscriptionId, Subscribers};
use crate::record::{RequestRecord, SystemSample};
use crate::store::MetricsStore;
use crate::telemetry::MonitorTelemetry;

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}

/// Applies threshold rules to newly recorded metrics.
///
/// Every rule fires once per triggering event. Raised alerts are appended to a
/// bounded log and delivered synchronously to subscribers. Rule failures are
/// logged and treated as "no alert".
#[derive(Debug)]
pub struct ThresholdEvaluator {
    clock: Clock,
    thresholds: Thresholds,
    error_rate_window: Duration,
    cooldown: Option<Duration>,
    last_raised: Mutex<HashMap<AlertKind, SystemTime>>,
    log: Mutex<AlertLog>,
    subscribers: Subscribers<Alert>,
    telemetry: MonitorTelemetry,
}

impl ThresholdEvaluator {
    pub(crate) fn new(
        clock: &Clock,
        thresholds: Thresholds,
        error_rate_window: Duration,
        cooldown: Option<Duration>,
        log_capacity: usize,
        telemetry: MonitorTelemetry,
    ) -> Self {
        Self {
            clock: clock.clone(),
            thresholds,
            error_rate_window,
            cooldown,
            last_raised: Mutex::new(HashMap::new()),
            log: Mutex::new(AlertLog::new(log_capacity)),
            subscribers: Subscribers::default(),
            telemetry,
        }
    }

    /// The active thresholds.
    #[must_use]
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Applies the request rules to a record already stored in `store`.
    ///
    /// Returns the alerts raised.
    pub fn evaluate_request(&self, record: &RequestRecord, store: &MetricsStore) -> Vec<Alert> {
        let mut raised = Vec::new();

        if let Some(limit) = self.thresholds.response_time()
            && record.duration > limit
        {
            let alert = Alert::new(
                AlertKind::SlowResponse,
                format!("request took {} ms, above the {} ms threshold", record.duration.as_millis(), limit.as_millis()),
                millis(limit),
                millis(record.duration),
                self.clock.system_time(),
            );
            raised.extend(self.raise(with_request_context(alert, record)));
        }

        if let Some(code) = record.status_code()
            && record.is_server_error()
        {
            let alert = Alert::new(
                AlertKind::ServerError,
                format!("request failed with status {code}"),
                500.0,
                f64::from(code),
                self.clock.system_time(),
            );
            raised.extend(self.raise(with_request_context(alert, record)));
        }

        if let Some(limit) = self.thresholds.error_rate {
            match self.error_rate(store) {
                Ok(rate) if rate > limit => {
                    let alert = Alert::new(
                        AlertKind::HighErrorRate,
                        format!("error rate {:.1}% above the {:.1}% threshold", rate * 100.0, limit * 100.0),
                        limit,
                        rate,
                        self.clock.system_time(),
                    );
                    raised.extend(self.raise(alert));
                }
                Ok(_) => {}
                Err(error) => log_skipped(&error),
            }
        }

        raised
    }

    /// Applies the resource rules to a sample. Failed samples never alert.
    pub fn evaluate_sample(&self, sample: &SystemSample) -> Vec<Alert> {
        if sample.is_error() {
            return Vec::new();
        }

        let mut raised = Vec::new();
        let checks = [
            (AlertKind::HighCpu, "CPU", self.thresholds.cpu, sample.cpu_percent),
            (AlertKind::HighMemory, "memory", self.thresholds.memory, sample.memory_percent()),
        ];

        for (kind, label, limit, percent) in checks {
            let Some(limit) = limit else { continue };
            let limit_percent = limit * 100.0;
            if percent > limit_percent {
                let alert = Alert::new(
                    kind,
                    format!("{label} usage {percent:.1}% above the {limit_percent:.1}% threshold"),
                    limit_percent,
                    percent,
                    self.clock.system_time(),
                );
                raised.extend(self.raise(alert));
            }
        }

        raised
    }

    fn error_rate(&self, store: &MetricsStore) -> Result<f64, EvaluationError> {
        let (requests, errors) = store.request_and_error_counts(self.error_rate_window);
        if requests == 0 {
            return Err(EvaluationError::caused_by(
                AlertKind::HighErrorRate.as_str(),
                "no requests in the rolling window",
            ));
        }

        #[expect(clippy::cast_precision_loss, reason = "counts stay far below 2^52")]
        let rate = errors as f64 / requests as f64;
        Ok(rate)
    }

    fn raise(&self, alert: Alert) -> Option<Alert> {
        if let Some(cooldown) = self.cooldown {
            let mut last_raised = self.last_raised.lock();
            if let Some(previous) = last_raised.get(&alert.kind)
                && alert.timestamp.duration_since(*previous).unwrap_or_default() < cooldown
            {
                tracing::debug!(alert.kind = alert.kind.as_str(), "alert.suppressed");
                return None;
            }
            last_raised.insert(alert.kind, alert.timestamp);
        }

        tracing::warn!(
            alert.id = %alert.id,
            alert.kind = alert.kind.as_str(),
            alert.severity = alert.severity.as_str(),
            alert.threshold = alert.threshold_value,
            alert.actual = alert.actual_value,
            "{}",
            alert.message
        );

        self.log.lock().push(alert.clone());
        self.telemetry.record_alert(&alert);
        self.subscribers.notify(&alert);
        Some(alert)
    }

    /// Registers a callback invoked for every raised alert.
    pub fn subscribe(&self, listener: impl Fn(&Alert) + Send + Sync + 'static) -> SubscriptionId {
        self.subscribers.subscribe(listener)
    }

    /// Removes an alert callback.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Up to `limit` alerts, newest first.
    #[must_use]
    pub fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        self.log.lock().recent(limit)
    }

    /// Marks an alert as acknowledged. Returns `false` if it is no longer in the log.
    pub fn acknowledge(&self, id: Uuid) -> bool {
        self.log.lock().acknowledge(id)
    }

    /// Number of logged alerts not yet acknowledged.
    #[must_use]
    pub fn unacknowledged_count(&self) -> usize {
        self.log.lock().unacknowledged()
    }

    /// Number of logged alerts raised during the last `window`.
    #[must_use]
    pub fn alert_count(&self, window: Duration) -> usize {
        let since = self.clock.system_time().checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH);
        self.log.lock().count_since(since)
    }

    /// Number of alerts currently held in the log.
    #[must_use]
    pub fn logged_alerts(&self) -> usize {
        self.log.lock().len()
    }
}

fn with_request_context(alert: Alert, record: &RequestRecord) -> Alert {
    let alert = alert.with_context("request_id", record.id.clone());
    match &record.metadata.path {
        Some(path) => alert.with_context("path", path.clone()),
        None => alert,
    }
}

fn log_skipped(error: &EvaluationError) {
    tracing::debug!(alert.rule = error.rule(), error = %error, "alert.rule_skipped");
}
