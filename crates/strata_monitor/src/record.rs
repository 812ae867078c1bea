// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Metric payloads.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use serde::Serialize;

/// Descriptive data attached to a tracked request.
///
/// # Examples
///
/// ```
/// use strata_monitor::RequestMetadata;
///
/// let metadata = RequestMetadata::new()
///     .method("GET")
///     .path("/donors")
///     .attribute("region", "NG");
/// assert_eq!(metadata.path.as_deref(), Some("/donors"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestMetadata {
    /// Request method, such as `GET`.
    pub method: Option<String>,
    /// Request path; used for the top-paths aggregate.
    pub path: Option<String>,
    /// Caller identity, if known.
    pub user_id: Option<String>,
    /// Free-form attributes.
    pub attributes: BTreeMap<String, String>,
}

impl RequestMetadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request method.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Sets the request path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the caller identity.
    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Adds a free-form attribute.
    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A named phase reached by a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseMark {
    /// Phase name.
    pub name: String,
    /// Wall-clock time the phase was reached.
    pub at: SystemTime,
    /// Time since the request started.
    pub elapsed: Duration,
    /// Optional data recorded with the mark.
    pub metadata: BTreeMap<String, String>,
}

/// Outcome reported when a request ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResponseInfo {
    /// Status code, if the request produced one.
    pub status_code: Option<u16>,
    /// Response size in bytes, if known.
    pub size_bytes: Option<u64>,
}

impl ResponseInfo {
    /// A response with the given status code.
    #[must_use]
    pub fn status(status_code: u16) -> Self {
        Self {
            status_code: Some(status_code),
            size_bytes: None,
        }
    }

    /// Sets the response size.
    #[must_use]
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }
}

/// A finalized request.
///
/// Produced once by [`RequestTracker::end`](crate::RequestTracker::end) and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestRecord {
    /// Request identifier.
    pub id: String,
    /// When the request started.
    pub started_at: SystemTime,
    /// When the request ended.
    pub ended_at: SystemTime,
    /// Total duration.
    pub duration: Duration,
    /// Metadata supplied at start.
    pub metadata: RequestMetadata,
    /// Phases in the order they were first reached.
    pub marks: Vec<PhaseMark>,
    /// Outcome supplied at end.
    pub response: ResponseInfo,
}

impl RequestRecord {
    /// Returns the response status code, if any.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.response.status_code
    }

    /// Returns `true` for status codes 500 and above.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_some_and(|code| code >= 500)
    }

    /// Returns the mark for `phase`, if it was reached.
    #[must_use]
    pub fn mark(&self, phase: &str) -> Option<&PhaseMark> {
        self.marks.iter().find(|mark| mark.name == phase)
    }
}

/// An error observed by the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    /// Error category used for the error-type histogram.
    pub error_type: String,
    /// Human-readable description.
    pub message: String,
    /// Request the error belongs to, if any.
    pub request_id: Option<String>,
    /// Additional context.
    pub context: BTreeMap<String, String>,
}

impl ErrorRecord {
    /// Creates an error record.
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            request_id: None,
            context: BTreeMap::new(),
        }
    }

    /// Associates the error with a request.
    #[must_use]
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Adds a context entry.
    #[must_use]
    pub fn context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// A named application-defined value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomMetric {
    /// Metric name.
    pub name: String,
    /// Observed value.
    pub value: f64,
    /// Tags, such as the cache tier that produced the value.
    pub tags: BTreeMap<String, String>,
}

/// Memory figures captured by the sampler, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    /// Resident set size of this process.
    pub resident_bytes: u64,
    /// Virtual memory size of this process.
    pub virtual_bytes: u64,
    /// Total physical memory of the host.
    pub system_total_bytes: u64,
    /// Memory still available to new allocations on the host.
    pub system_available_bytes: u64,
}

impl MemoryUsage {
    /// Host memory in use as a percentage in `[0, 100]`.
    ///
    /// Returns `0.0` when the host total is unknown.
    #[must_use]
    pub fn system_used_percent(&self) -> f64 {
        if self.system_total_bytes == 0 {
            return 0.0;
        }

        let used = self.system_total_bytes.saturating_sub(self.system_available_bytes);
        #[expect(clippy::cast_precision_loss, reason = "percentages tolerate rounding")]
        let percent = used as f64 / self.system_total_bytes as f64 * 100.0;
        percent
    }
}

/// Disk figures for the monitored mount, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiskUsage {
    /// Capacity of the filesystem.
    pub total_bytes: u64,
    /// Space available to unprivileged users.
    pub available_bytes: u64,
}

/// One resource sample.
///
/// Failed samples are zeroed and carry the failure in `error`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemSample {
    /// Process CPU usage as a percentage of all cores, in `[0, 100]`.
    pub cpu_percent: f64,
    /// Memory figures.
    pub memory: MemoryUsage,
    /// Disk figures, if the platform reports them.
    pub disk: Option<DiskUsage>,
    /// Why part or all of the sample could not be collected.
    pub error: Option<String>,
}

impl SystemSample {
    /// A zeroed sample tagged with `error`.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Host memory in use as a percentage.
    #[must_use]
    pub fn memory_percent(&self) -> f64 {
        self.memory.system_used_percent()
    }

    /// Returns `true` if the sample carries an error tag.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_percent_guards_unknown_total() {
        assert!(MemoryUsage::default().system_used_percent().abs() < f64::EPSILON);

        let usage = MemoryUsage {
            system_total_bytes: 1_000,
            system_available_bytes: 250,
            ..MemoryUsage::default()
        };
        assert!((usage.system_used_percent() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn failed_sample_is_zeroed() {
        let sample = SystemSample::failed("platform not supported");
        assert!(sample.is_error());
        assert!(sample.cpu_percent.abs() < f64::EPSILON);
        assert_eq!(sample.memory, MemoryUsage::default());
    }

    #[test]
    fn server_error_detection() {
        let record = RequestRecord {
            id: "r".to_owned(),
            started_at: SystemTime::UNIX_EPOCH,
            ended_at: SystemTime::UNIX_EPOCH,
            duration: Duration::ZERO,
            metadata: RequestMetadata::new(),
            marks: Vec::new(),
            response: ResponseInfo::status(503),
        };
        assert!(record.is_server_error());
        assert!(!RequestRecord {
            response: ResponseInfo::status(404),
            ..record
        }
        .is_server_error());
    }
}
