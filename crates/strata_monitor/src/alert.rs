// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Alerts raised by threshold rules.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::SystemTime;

use serde::Serialize;
use uuid::Uuid;

/// The rule that raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum AlertKind {
    /// A request exceeded the response-time threshold.
    SlowResponse,
    /// A request ended with a 5xx status.
    ServerError,
    /// The rolling error rate exceeded its threshold.
    HighErrorRate,
    /// Process CPU usage exceeded its threshold.
    HighCpu,
    /// Host memory usage exceeded its threshold.
    HighMemory,
}

impl AlertKind {
    /// Stable name used in logs and metric attributes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SlowResponse => "slow_response",
            Self::ServerError => "server_error",
            Self::HighErrorRate => "high_error_rate",
            Self::HighCpu => "high_cpu",
            Self::HighMemory => "high_memory",
        }
    }

    /// Severity assigned to alerts of this kind.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::SlowResponse | Self::HighCpu | Self::HighMemory => Severity::Warning,
            Self::ServerError | Self::HighErrorRate => Severity::Error,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How urgent an alert is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Degraded but serving.
    Warning,
    /// Failing requests.
    Error,
}

impl Severity {
    /// Stable name used in logs and metric attributes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A threshold violation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// Unique identifier.
    pub id: Uuid,
    /// Rule that fired.
    pub kind: AlertKind,
    /// Urgency.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// Configured threshold, in the unit of `actual_value`.
    pub threshold_value: f64,
    /// Observed value.
    pub actual_value: f64,
    /// Additional data, such as the request id or path.
    pub context: BTreeMap<String, String>,
    /// When the alert was raised.
    pub timestamp: SystemTime,
    /// Set once an operator has acknowledged the alert.
    pub acknowledged: bool,
}

impl Alert {
    pub(crate) fn new(kind: AlertKind, message: String, threshold_value: f64, actual_value: f64, timestamp: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity: kind.severity(),
            message,
            threshold_value,
            actual_value,
            context: BTreeMap::new(),
            timestamp,
            acknowledged: false,
        }
    }

    #[must_use]
    pub(crate) fn with_context(mut self, key: &str, value: impl Into<String>) -> Self {
        self.context.insert(key.to_owned(), value.into());
        self
    }
}

/// Bounded log of raised alerts, oldest evicted first.
#[derive(Debug)]
pub(crate) struct AlertLog {
    capacity: usize,
    alerts: VecDeque<Alert>,
}

impl AlertLog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            alerts: VecDeque::new(),
        }
    }

    pub(crate) fn push(&mut self, alert: Alert) {
        while self.alerts.len() >= self.capacity {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    /// Up to `limit` alerts, newest first.
    pub(crate) fn recent(&self, limit: usize) -> Vec<Alert> {
        self.alerts.iter().rev().take(limit).cloned().collect()
    }

    pub(crate) fn acknowledge(&mut self, id: Uuid) -> bool {
        self.alerts.iter_mut().find(|alert| alert.id == id).is_some_and(|alert| {
            alert.acknowledged = true;
            true
        })
    }

    pub(crate) fn unacknowledged(&self) -> usize {
        self.alerts.iter().filter(|alert| !alert.acknowledged).count()
    }

    pub(crate) fn count_since(&self, since: SystemTime) -> usize {
        self.alerts.iter().filter(|alert| alert.timestamp >= since).count()
    }

    pub(crate) fn len(&self) -> usize {
        self.alerts.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn alert(kind: AlertKind, at_secs: u64) -> Alert {
        Alert::new(
            kind,
            kind.to_string(),
            1.0,
            2.0,
            SystemTime::UNIX_EPOCH + Duration::from_secs(at_secs),
        )
    }

    #[test]
    fn severities() {
        assert_eq!(AlertKind::SlowResponse.severity(), Severity::Warning);
        assert_eq!(AlertKind::ServerError.severity(), Severity::Error);
        assert_eq!(AlertKind::HighErrorRate.as_str(), "high_error_rate");
    }

    #[test]
    fn log_is_bounded_newest_first() {
        let mut log = AlertLog::new(2);
        log.push(alert(AlertKind::HighCpu, 1));
        log.push(alert(AlertKind::HighMemory, 2));
        log.push(alert(AlertKind::ServerError, 3));

        assert_eq!(log.len(), 2);
        let kinds: Vec<_> = log.recent(10).into_iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::ServerError, AlertKind::HighMemory]);
    }

    #[test]
    fn acknowledge_and_count() {
        let mut log = AlertLog::new(10);
        let first = alert(AlertKind::HighCpu, 10);
        let id = first.id;
        log.push(first);
        log.push(alert(AlertKind::HighCpu, 20));

        assert_eq!(log.unacknowledged(), 2);
        assert!(log.acknowledge(id));
        assert!(!log.acknowledge(Uuid::new_v4()));
        assert_eq!(log.unacknowledged(), 1);
        assert_eq!(log.count_since(SystemTime::UNIX_EPOCH + Duration::from_secs(15)), 1);
    }

    #[test]
    fn serializes_kind_in_snake_case() {
        let json = serde_json::to_value(alert(AlertKind::SlowResponse, 0)).expect("serializes");
        assert_eq!(json["kind"], "slow_response");
        assert_eq!(json["severity"], "warning");
    }
}
