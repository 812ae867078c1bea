// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for cache operations.

use std::fmt;

/// Broad category of a tier failure.
///
/// Callers branch on the kind to decide whether a failure degrades to a miss,
/// rejects a single write, or is surfaced to an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The backing store could not be reached or timed out.
    Unavailable,
    /// The entry does not fit within the tier's capacity limits.
    CapacityExceeded,
    /// The tier does not support the requested operation.
    Unsupported,
    /// An invalidation pattern was rejected.
    InvalidPattern,
    /// Stored bytes could not be decoded.
    Serialization,
    /// Any other failure.
    Other,
}

impl ErrorKind {
    /// Returns a stable, lowercase name for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::Unsupported => "unsupported",
            Self::InvalidPattern => "invalid_pattern",
            Self::Serialization => "serialization",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error from a cache tier operation.
///
/// The underlying cause is kept in the error chain; use [`Error::kind`] to
/// classify the failure.
///
/// # Example
///
/// ```
/// use strata_tier::{Error, ErrorKind};
///
/// let error = Error::unavailable("connection refused");
/// assert_eq!(error.kind(), ErrorKind::Unavailable);
/// ```
#[ohno::error]
#[display("cache tier error ({kind})")]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Creates an error of kind [`ErrorKind::Other`] from any error-like cause.
    pub fn from_message(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Other, cause)
    }

    /// Creates an error with an explicit kind and cause.
    pub fn with_kind(kind: ErrorKind, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(kind, cause)
    }

    /// The backing store could not be reached.
    pub fn unavailable(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Unavailable, cause)
    }

    /// The entry exceeds the tier's capacity.
    pub fn capacity_exceeded(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::CapacityExceeded, cause)
    }

    /// The tier does not implement `operation`.
    #[must_use]
    pub fn unsupported(operation: &'static str) -> Self {
        Self::caused_by(ErrorKind::Unsupported, format!("{operation} is not supported by this tier"))
    }

    /// Stored bytes could not be decoded.
    pub fn serialization(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Serialization, cause)
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// A specialized [`Result`] type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_kind_and_cause() {
        let error = Error::unavailable("connection reset");
        let display_str = format!("{error}");
        assert!(display_str.contains("unavailable"), "got: {display_str}");
        assert!(display_str.contains("connection reset"), "got: {display_str}");
    }

    #[test]
    fn error_debug_contains_cause_message() {
        let error = Error::from_message("test error message");
        let debug_str = format!("{error:?}");
        assert!(
            debug_str.contains("test error message"),
            "debug output should contain the cause message, got: {debug_str}"
        );
    }

    #[test]
    fn constructors_set_kind() {
        assert_eq!(Error::from_message("x").kind(), ErrorKind::Other);
        assert_eq!(Error::capacity_exceeded("x").kind(), ErrorKind::CapacityExceeded);
        assert_eq!(Error::unsupported("scan").kind(), ErrorKind::Unsupported);
        assert_eq!(Error::serialization("x").kind(), ErrorKind::Serialization);
        assert_eq!(Error::with_kind(ErrorKind::InvalidPattern, "x").kind(), ErrorKind::InvalidPattern);
    }

    #[test]
    fn result_type_alias_propagates_errors() {
        fn returns_err() -> Result<i32> {
            Err(Error::from_message("expected failure"))
        }

        let err = returns_err().expect_err("should return an error");
        assert!(format!("{err}").contains("expected failure"));
    }
}
