// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tier-level cache events.

use std::time::Duration;

use strata_tier::TierKind;

/// The tier call an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CacheOperation {
    /// A lookup.
    Get,
    /// A write, including backfills.
    Insert,
    /// A single-key removal.
    Invalidate,
    /// A pattern removal.
    InvalidateMatching,
    /// A full clear.
    Clear,
    /// A health probe.
    HealthCheck,
}

impl CacheOperation {
    /// Returns the operation name used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "cache.get",
            Self::Insert => "cache.insert",
            Self::Invalidate => "cache.invalidate",
            Self::InvalidateMatching => "cache.invalidate_matching",
            Self::Clear => "cache.clear",
            Self::HealthCheck => "cache.health_check",
        }
    }
}

/// What happened during a tier call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CacheActivity {
    /// The tier returned a live entry.
    Hit,
    /// The tier had no entry.
    Miss,
    /// The tier returned an entry past its TTL, which was discarded.
    Expired,
    /// A caller write succeeded.
    Inserted,
    /// A value found in a slower tier was copied into this one.
    Backfilled,
    /// A removal succeeded.
    Invalidated,
    /// Any other call succeeded.
    Ok,
    /// The call did not finish within the tier timeout.
    Timeout,
    /// The call failed.
    Error,
}

impl CacheActivity {
    /// Returns the activity name used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "cache.hit",
            Self::Miss => "cache.miss",
            Self::Expired => "cache.expired",
            Self::Inserted => "cache.inserted",
            Self::Backfilled => "cache.backfilled",
            Self::Invalidated => "cache.invalidated",
            Self::Ok => "cache.ok",
            Self::Timeout => "cache.timeout",
            Self::Error => "cache.error",
        }
    }
}

/// A single tier call as observed by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    /// The tier that was called.
    pub tier: TierKind,
    /// The operation performed.
    pub operation: CacheOperation,
    /// The outcome.
    pub activity: CacheActivity,
    /// The composed key, for single-key operations.
    pub key: Option<String>,
    /// Wall time of the call.
    pub duration: Duration,
}

impl CacheEvent {
    /// Name of the custom metric this event is recorded under, if any.
    ///
    /// Hits, misses, writes, removals and failures are recorded; other events are not.
    #[must_use]
    pub const fn metric_name(&self) -> Option<&'static str> {
        match self.activity {
            CacheActivity::Hit => Some("cache_hit"),
            CacheActivity::Miss | CacheActivity::Expired => Some("cache_miss"),
            CacheActivity::Inserted | CacheActivity::Backfilled => Some("cache_set"),
            CacheActivity::Invalidated => Some("cache_delete"),
            CacheActivity::Timeout | CacheActivity::Error => Some("cache_error"),
            CacheActivity::Ok => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(activity: CacheActivity) -> CacheEvent {
        CacheEvent {
            tier: TierKind::Memory,
            operation: CacheOperation::Get,
            activity,
            key: None,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn expired_counts_as_miss() {
        assert_eq!(event(CacheActivity::Expired).metric_name(), Some("cache_miss"));
        assert_eq!(event(CacheActivity::Backfilled).metric_name(), Some("cache_set"));
        assert_eq!(event(CacheActivity::Ok).metric_name(), None);
    }
}
