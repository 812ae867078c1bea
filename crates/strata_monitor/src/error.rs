// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for monitoring.

/// A configuration value was rejected during validation.
///
/// # Example
///
/// ```
/// use strata_monitor::MonitorConfig;
///
/// let mut config = MonitorConfig::default();
/// config.thresholds.cpu = Some(1.5);
/// assert!(config.validate().is_err());
/// ```
#[ohno::error]
#[display("invalid configuration: {reason}")]
pub struct ConfigError {
    reason: String,
}

impl ConfigError {
    /// Creates an error describing why the configuration was rejected.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::new(reason.into())
    }

    /// Returns the human-readable reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// A threshold rule could not be evaluated.
///
/// These never reach callers: the evaluator logs them and skips the rule.
#[ohno::error]
#[display("threshold rule {rule} could not be evaluated")]
pub struct EvaluationError {
    rule: &'static str,
}

impl EvaluationError {
    pub(crate) fn rule(&self) -> &'static str {
        self.rule
    }
}

/// A resource probe could not read a figure from the platform.
#[ohno::error]
#[display("could not read {resource}")]
pub struct ProbeError {
    resource: &'static str,
}

impl ProbeError {
    /// Creates an error for `resource`, caused by `cause`.
    pub fn unavailable(resource: &'static str, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(resource, cause)
    }

    /// The figure that could not be read.
    #[must_use]
    pub fn resource(&self) -> &'static str {
        self.resource
    }
}
