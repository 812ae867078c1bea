// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache entry type with expiry metadata.

use std::time::{Duration, SystemTime};

use bytes::Bytes;

/// A cached value with optional timestamp and TTL.
///
/// The `cached_at` timestamp is stamped by the tier chain on insert; tiers that
/// receive an entry without it stamp it themselves. An entry is expired once the
/// current time is strictly past `cached_at + ttl`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use strata_tier::CacheEntry;
///
/// let entry = CacheEntry::with_ttl("payload", Duration::from_secs(300));
/// assert_eq!(entry.value().as_ref(), b"payload");
/// assert_eq!(entry.ttl(), Some(Duration::from_secs(300)));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    value: Bytes,
    cached_at: Option<SystemTime>,
    ttl: Option<Duration>,
}

impl CacheEntry {
    /// Creates a new cache entry that never expires on its own.
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            value: value.into(),
            cached_at: None,
            ttl: None,
        }
    }

    /// Creates a new cache entry with a time-to-live.
    pub fn with_ttl(value: impl Into<Bytes>, ttl: Duration) -> Self {
        Self {
            value: value.into(),
            cached_at: None,
            ttl: Some(ttl),
        }
    }

    /// Creates a new cache entry with an explicit insertion timestamp.
    pub fn with_cached_at(value: impl Into<Bytes>, cached_at: SystemTime, ttl: Option<Duration>) -> Self {
        Self {
            value: value.into(),
            cached_at: Some(cached_at),
            ttl,
        }
    }

    /// Returns a reference to the cached bytes.
    #[must_use]
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Consumes the entry and returns the cached bytes.
    #[must_use]
    pub fn into_value(self) -> Bytes {
        self.value
    }

    /// Returns when this entry was cached, if stamped.
    #[must_use]
    pub fn cached_at(&self) -> Option<SystemTime> {
        self.cached_at
    }

    /// Returns the time-to-live for this entry.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Sets the time-to-live for this entry.
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = Some(ttl);
    }

    /// Stamps the insertion time unless the entry already carries one.
    pub fn ensure_cached_at(&mut self, now: SystemTime) {
        if self.cached_at.is_none() {
            self.cached_at = Some(now);
        }
    }

    /// Returns the instant after which this entry is no longer served.
    ///
    /// `None` means the entry has no TTL or was never stamped.
    #[must_use]
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.cached_at?.checked_add(self.ttl?)
    }

    /// Returns `true` if `now` is strictly past the expiry instant.
    #[must_use]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at().is_some_and(|expires_at| now > expires_at)
    }

    /// Returns the TTL still left at `now`, or `None` when the entry never expires.
    #[must_use]
    pub fn remaining_ttl(&self, now: SystemTime) -> Option<Duration> {
        self.expires_at()
            .map(|expires_at| expires_at.duration_since(now).unwrap_or(Duration::ZERO))
    }

    /// Size of the cached payload in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.value.len() as u64
    }
}
