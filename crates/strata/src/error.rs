// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types surfaced by administrative operations.

/// Configuration could not be loaded or was rejected.
///
/// # Example
///
/// ```
/// use strata::StrataConfig;
///
/// let error = StrataConfig::from_toml_str("[cache]\ndefault_ttl_secs = 0").unwrap_err();
/// assert!(error.reason().contains("default_ttl_secs"));
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

    pub(crate) fn unreadable(reason: impl Into<String>, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(reason.into(), cause)
    }

    /// Returns the human-readable reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<strata_monitor::ConfigError> for ConfigError {
    fn from(error: strata_monitor::ConfigError) -> Self {
        Self::new(format!("monitor.{}", error.reason()))
    }
}

/// A cancellable read was aborted before the tier walk finished.
#[ohno::error]
#[display("cache read of {key} was aborted")]
pub struct Aborted {
    key: String,
}

impl Aborted {
    pub(crate) fn read(key: &str) -> Self {
        Self::new(key.to_owned())
    }

    /// The raw key that was being read.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}
