// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use strata_tier::{CacheEntry, CacheTier, Error, KeyPattern};
use tick::Clock;

use crate::builder::InMemoryTierBuilder;
use crate::lru::{Lookup, LruState};

/// Bounded in-process cache tier with LRU eviction and TTL expiry.
///
/// Capacity is bounded both by entry count and by an estimate of stored bytes
/// (key length plus payload length). When an insert would exceed either bound,
/// the least recently accessed entries are evicted until it fits.
///
/// Expired entries are dropped lazily when read, and proactively by
/// [`sweep_expired`](Self::sweep_expired), which removes due entries in bounded
/// batches so the lock is never held for long.
///
/// Cloning is cheap and yields a handle to the same storage.
///
/// # Examples
///
/// ```
/// use strata_memory::InMemoryTier;
/// use tick::Clock;
///
/// # fn example(clock: &Clock) {
/// let tier = InMemoryTier::builder(clock)
///     .max_entries(1_000)
///     .max_bytes(16 * 1024 * 1024)
///     .name("sessions")
///     .build();
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryTier {
    inner: Arc<Inner>,
}

struct Inner {
    clock: Clock,
    state: Mutex<LruState>,
    max_entries: usize,
    max_bytes: u64,
    sweep_batch: usize,
    name: Option<String>,
}

/// Point-in-time counters for an [`InMemoryTier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct MemoryTierStats {
    /// Number of stored entries.
    pub entries: u64,
    /// Estimated bytes held by stored entries.
    pub bytes: u64,
    /// Entries removed to make room for new ones.
    pub evictions: u64,
    /// Entries removed because their TTL elapsed.
    pub expirations: u64,
    /// Configured entry limit.
    pub max_entries: u64,
    /// Configured byte limit.
    pub max_bytes: u64,
}

/// Access metadata for a single stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct EntryInfo {
    /// Number of successful reads since insertion.
    pub access_count: u64,
    /// When the entry was stored in this tier.
    pub created_at: SystemTime,
    /// When the entry was last read, or `created_at` if never read.
    pub last_accessed_at: SystemTime,
    /// When the entry stops being served, if it has a TTL.
    pub expires_at: Option<SystemTime>,
    /// Estimated size in bytes.
    pub size_bytes: u64,
}

impl InMemoryTier {
    /// Creates a tier with default limits.
    #[must_use]
    pub fn new(clock: &Clock) -> Self {
        Self::builder(clock).build()
    }

    /// Creates a builder for configuring an in-memory tier.
    #[must_use]
    pub fn builder(clock: &Clock) -> InMemoryTierBuilder {
        InMemoryTierBuilder::new(clock)
    }

    pub(crate) fn from_builder(builder: InMemoryTierBuilder) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock: builder.clock,
                state: Mutex::new(LruState::default()),
                max_entries: builder.max_entries,
                max_bytes: builder.max_bytes,
                sweep_batch: builder.sweep_batch,
                name: builder.name,
            }),
        }
    }

    /// Returns the tier name, if one was configured.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Removes every expired entry, returning how many were removed.
    ///
    /// Work is split into batches and the lock is released between batches.
    pub fn sweep_expired(&self) -> u64 {
        let mut total = 0_u64;
        loop {
            let now = self.inner.clock.system_time();
            let removed = self.inner.state.lock().purge_expired(now, self.inner.sweep_batch);
            total += removed as u64;
            if removed < self.inner.sweep_batch {
                break;
            }
        }

        if total > 0 {
            tracing::debug!(cache.name = self.name(), cache.expired = total, "cache.sweep");
        }

        total
    }

    /// Returns current counters.
    #[must_use]
    pub fn stats(&self) -> MemoryTierStats {
        let state = self.inner.state.lock();
        MemoryTierStats {
            entries: state.len() as u64,
            bytes: state.total_bytes(),
            evictions: state.evictions,
            expirations: state.expirations,
            max_entries: self.inner.max_entries as u64,
            max_bytes: self.inner.max_bytes,
        }
    }

    /// Returns access metadata for `key` without affecting its recency.
    #[must_use]
    pub fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        let state = self.inner.state.lock();
        state.peek(key).map(|slot| EntryInfo {
            access_count: slot.access_count,
            created_at: slot.created_at,
            last_accessed_at: slot.last_accessed_at,
            expires_at: slot.entry.expires_at(),
            size_bytes: slot.size,
        })
    }

    /// Returns `true` if `key` is stored and not expired, without affecting its recency.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.inner.clock.system_time();
        self.inner
            .state
            .lock()
            .peek(key)
            .is_some_and(|slot| !slot.entry.is_expired_at(now))
    }
}

impl Debug for InMemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTier")
            .field("name", &self.inner.name)
            .field("max_entries", &self.inner.max_entries)
            .field("max_bytes", &self.inner.max_bytes)
            .finish_non_exhaustive()
    }
}

impl CacheTier for InMemoryTier {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let now = self.inner.clock.system_time();
        let lookup = self.inner.state.lock().get(key, now);
        match lookup {
            Lookup::Hit(entry) => Ok(Some(entry)),
            Lookup::Expired => {
                tracing::debug!(cache.name = self.name(), "cache.expired");
                Ok(None)
            }
            Lookup::Miss => Ok(None),
        }
    }

    async fn insert(&self, key: &str, mut entry: CacheEntry) -> Result<(), Error> {
        let size = key.len() as u64 + entry.size_bytes();
        if size > self.inner.max_bytes {
            return Err(Error::capacity_exceeded(format!(
                "entry of {size} bytes exceeds the tier limit of {} bytes",
                self.inner.max_bytes
            )));
        }

        let now = self.inner.clock.system_time();
        entry.ensure_cached_at(now);

        let evicted = self.inner.state.lock().insert(
            key.to_owned(),
            entry,
            size,
            now,
            self.inner.max_entries,
            self.inner.max_bytes,
        );

        if evicted > 0 {
            tracing::debug!(cache.name = self.name(), cache.evicted = evicted, "cache.evict");
        }

        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<bool, Error> {
        Ok(self.inner.state.lock().remove(key).is_some())
    }

    async fn invalidate_matching(&self, pattern: &KeyPattern) -> Result<u64, Error> {
        let matching: Vec<String> = self
            .inner
            .state
            .lock()
            .iter()
            .map(|(key, _)| key)
            .filter(|key| pattern.matches(key))
            .cloned()
            .collect();

        let now = self.inner.clock.system_time();
        let mut removed = 0_u64;
        for chunk in matching.chunks(self.inner.sweep_batch) {
            let mut state = self.inner.state.lock();
            for key in chunk {
                match state.remove(key) {
                    // Already dead; it expired rather than being invalidated.
                    Some(slot) if slot.entry.is_expired_at(now) => state.expirations += 1,
                    Some(_) => removed += 1,
                    None => {}
                }
            }
        }

        Ok(removed)
    }

    async fn clear(&self) -> Result<(), Error> {
        self.inner.state.lock().clear();
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        Ok(())
    }

    fn len(&self) -> Option<u64> {
        Some(self.inner.state.lock().len() as u64)
    }
}
