// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Monitoring configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Alert thresholds. `None` disables the corresponding rule.
///
/// Rates and resource usages are fractions in `(0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    /// Requests slower than this raise `slow_response`.
    pub response_time_ms: Option<u64>,
    /// A rolling error rate above this raises `high_error_rate`.
    pub error_rate: Option<f64>,
    /// CPU usage above this raises `high_cpu`.
    pub cpu: Option<f64>,
    /// System memory usage above this raises `high_memory`.
    pub memory: Option<f64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            response_time_ms: Some(1_000),
            error_rate: Some(0.05),
            cpu: Some(0.80),
            memory: Some(0.85),
        }
    }
}

impl Thresholds {
    /// The slow-request threshold as a duration.
    #[must_use]
    pub fn response_time(&self) -> Option<Duration> {
        self.response_time_ms.map(Duration::from_millis)
    }
}

/// Settings for the monitoring half of Strata.
///
/// Loaded once at startup; every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// How long metric buckets are kept.
    pub retention_secs: u64,
    /// How often the system sampler runs.
    pub sampling_interval_secs: u64,
    /// Length of the CPU measurement window inside each sample.
    pub cpu_window_ms: u64,
    /// How often expired buckets are pruned.
    pub prune_interval_secs: u64,
    /// How often open requests are checked for orphans.
    pub orphan_sweep_interval_secs: u64,
    /// Age after which an open request counts as orphaned.
    ///
    /// Defaults to ten times the slow-response threshold.
    pub max_request_age_ms: Option<u64>,
    /// Rolling window for the error-rate rule.
    pub error_rate_window_secs: u64,
    /// Number of alerts retained in the rolling log.
    pub alert_log_capacity: usize,
    /// Number of paths reported in summaries.
    pub top_paths: usize,
    /// Minimum spacing between two alerts of the same kind; `None` reports every event.
    pub alert_cooldown_secs: Option<u64>,
    /// Alert thresholds.
    pub thresholds: Thresholds,
}

/// Fallback orphan age when the slow-response rule is disabled.
const FALLBACK_MAX_REQUEST_AGE: Duration = Duration::from_secs(60);

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            retention_secs: 24 * 60 * 60,
            sampling_interval_secs: 5,
            cpu_window_ms: 100,
            prune_interval_secs: 60,
            orphan_sweep_interval_secs: 60,
            max_request_age_ms: None,
            error_rate_window_secs: 5 * 60,
            alert_log_capacity: 1_000,
            top_paths: 10,
            alert_cooldown_secs: None,
            thresholds: Thresholds::default(),
        }
    }
}

impl MonitorConfig {
    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first rejected field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("retention_secs", self.retention_secs),
            ("sampling_interval_secs", self.sampling_interval_secs),
            ("prune_interval_secs", self.prune_interval_secs),
            ("orphan_sweep_interval_secs", self.orphan_sweep_interval_secs),
            ("error_rate_window_secs", self.error_rate_window_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::invalid(format!("{name} must be greater than zero")));
            }
        }

        if self.alert_log_capacity == 0 {
            return Err(ConfigError::invalid("alert_log_capacity must be greater than zero"));
        }

        if self.max_request_age_ms == Some(0) {
            return Err(ConfigError::invalid("max_request_age_ms must be greater than zero"));
        }

        if self.thresholds.response_time_ms == Some(0) {
            return Err(ConfigError::invalid("thresholds.response_time_ms must be greater than zero"));
        }

        let fractions = [
            ("thresholds.error_rate", self.thresholds.error_rate),
            ("thresholds.cpu", self.thresholds.cpu),
            ("thresholds.memory", self.thresholds.memory),
        ];
        for (name, value) in fractions {
            if let Some(value) = value
                && !(value > 0.0 && value <= 1.0)
            {
                return Err(ConfigError::invalid(format!("{name} must be within (0, 1], got {value}")));
            }
        }

        Ok(())
    }

    /// Retention window for metric buckets.
    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Interval between system samples.
    #[must_use]
    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs(self.sampling_interval_secs)
    }

    /// CPU measurement window.
    #[must_use]
    pub fn cpu_window(&self) -> Duration {
        Duration::from_millis(self.cpu_window_ms)
    }

    /// Interval between bucket prunes.
    #[must_use]
    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }

    /// Interval between orphan sweeps.
    #[must_use]
    pub fn orphan_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.orphan_sweep_interval_secs)
    }

    /// Age after which open requests are dropped.
    #[must_use]
    pub fn max_request_age(&self) -> Duration {
        match (self.max_request_age_ms, self.thresholds.response_time()) {
            (Some(ms), _) => Duration::from_millis(ms),
            (None, Some(slow)) => slow * 10,
            (None, None) => FALLBACK_MAX_REQUEST_AGE,
        }
    }

    /// Rolling window for the error-rate rule.
    #[must_use]
    pub fn error_rate_window(&self) -> Duration {
        Duration::from_secs(self.error_rate_window_secs)
    }

    /// Minimum spacing between alerts of one kind.
    #[must_use]
    pub fn alert_cooldown(&self) -> Option<Duration> {
        self.alert_cooldown_secs.map(Duration::from_secs)
    }
}
