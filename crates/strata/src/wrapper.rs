// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Wrapper that adds timeouts, TTL checks, counters and events to a tier.

use std::sync::Arc;
use std::time::Duration;

use strata_monitor::Subscribers;
use strata_tier::{CacheEntry, CacheTier, DynamicTier, Error, ErrorKind, KeyPattern, TierKind};
use tick::{Clock, FutureExt};

use crate::events::{CacheActivity, CacheEvent, CacheOperation};
use crate::stats::{TierCounters, TierStats};
use crate::telemetry::CacheTelemetry;

/// A tier as held by the router.
///
/// Every call is timed, bounded by the optional timeout, counted, logged and
/// published to the router's event subscribers. Entries past their TTL are
/// treated as misses even if the tier still returns them.
#[derive(Debug)]
pub(crate) struct ManagedTier {
    kind: TierKind,
    inner: DynamicTier,
    timeout: Option<Duration>,
    clock: Clock,
    counters: TierCounters,
    telemetry: CacheTelemetry,
    events: Arc<Subscribers<CacheEvent>>,
}

impl ManagedTier {
    pub(crate) fn new(
        kind: TierKind,
        inner: DynamicTier,
        timeout: Option<Duration>,
        clock: Clock,
        telemetry: CacheTelemetry,
        events: Arc<Subscribers<CacheEvent>>,
    ) -> Self {
        Self {
            kind,
            inner,
            timeout,
            clock,
            counters: TierCounters::default(),
            telemetry,
            events,
        }
    }

    pub(crate) fn kind(&self) -> TierKind {
        self.kind
    }

    pub(crate) fn stats(&self) -> TierStats {
        self.counters.snapshot(self.kind, self.inner.len())
    }

    async fn call<T>(&self, future: impl Future<Output = Result<T, Error>>) -> (Result<T, Error>, Duration, bool) {
        let start = self.clock.instant();
        let (result, timed_out) = match self.timeout {
            Some(timeout) => match future.timeout(&self.clock, timeout).await {
                Ok(result) => (result, false),
                Err(elapsed) => (Err(Error::unavailable(elapsed)), true),
            },
            None => (future.await, false),
        };
        (result, self.clock.instant().saturating_duration_since(start), timed_out)
    }

    fn publish(&self, operation: CacheOperation, activity: CacheActivity, key: Option<&str>, duration: Duration) {
        self.counters.count(operation, activity);
        let event = CacheEvent {
            tier: self.kind,
            operation,
            activity,
            key: key.map(str::to_owned),
            duration,
        };
        self.telemetry.record(&event);
        self.events.notify(&event);
    }

    fn publish_failure(&self, operation: CacheOperation, key: Option<&str>, error: &Error, timed_out: bool, duration: Duration) {
        let activity = if timed_out { CacheActivity::Timeout } else { CacheActivity::Error };
        tracing::warn!(
            cache.tier = self.kind.as_str(),
            cache.operation = operation.as_str(),
            error.kind = error.kind().as_str(),
            error = %error,
            "cache.tier_failed"
        );
        self.publish(operation, activity, key, duration);
    }

    fn publish_size(&self) {
        if let Some(size) = self.inner.len() {
            self.telemetry.record_size(self.kind, size);
        }
    }

    /// Looks `key` up. Failures and timeouts are reported as misses.
    pub(crate) async fn get(&self, key: &str) -> Option<CacheEntry> {
        let (result, duration, timed_out) = self.call(self.inner.get(key)).await;
        match result {
            Ok(Some(entry)) if entry.is_expired_at(self.clock.system_time()) => {
                self.publish(CacheOperation::Get, CacheActivity::Expired, Some(key), duration);
                None
            }
            Ok(Some(entry)) => {
                self.publish(CacheOperation::Get, CacheActivity::Hit, Some(key), duration);
                Some(entry)
            }
            Ok(None) => {
                self.publish(CacheOperation::Get, CacheActivity::Miss, Some(key), duration);
                None
            }
            Err(error) => {
                self.publish_failure(CacheOperation::Get, Some(key), &error, timed_out, duration);
                None
            }
        }
    }

    /// Writes `entry`, returning whether the tier accepted it.
    pub(crate) async fn insert(&self, key: &str, entry: CacheEntry, backfill: bool) -> bool {
        let (result, duration, timed_out) = self.call(self.inner.insert(key, entry)).await;
        match result {
            Ok(()) => {
                let activity = if backfill { CacheActivity::Backfilled } else { CacheActivity::Inserted };
                self.publish(CacheOperation::Insert, activity, Some(key), duration);
                self.publish_size();
                true
            }
            Err(error) => {
                self.publish_failure(CacheOperation::Insert, Some(key), &error, timed_out, duration);
                false
            }
        }
    }

    /// Removes `key`. `Ok(false)` means the key was not present.
    pub(crate) async fn invalidate(&self, key: &str) -> Result<bool, Error> {
        let (result, duration, timed_out) = self.call(self.inner.invalidate(key)).await;
        match &result {
            Ok(true) => {
                self.publish(CacheOperation::Invalidate, CacheActivity::Invalidated, Some(key), duration);
                self.publish_size();
            }
            Ok(false) => self.publish(CacheOperation::Invalidate, CacheActivity::Ok, Some(key), duration),
            Err(error) => self.publish_failure(CacheOperation::Invalidate, Some(key), error, timed_out, duration),
        }
        result
    }

    /// Removes every key matching `pattern`.
    ///
    /// Tiers that cannot scan return `Ok(None)` after logging a warning.
    pub(crate) async fn invalidate_matching(&self, pattern: &KeyPattern) -> Result<Option<u64>, Error> {
        let (result, duration, timed_out) = self.call(self.inner.invalidate_matching(pattern)).await;
        match result {
            Ok(removed) => {
                self.publish(CacheOperation::InvalidateMatching, CacheActivity::Ok, None, duration);
                self.publish_size();
                Ok(Some(removed))
            }
            Err(error) if error.kind() == ErrorKind::Unsupported => {
                tracing::warn!(
                    cache.tier = self.kind.as_str(),
                    cache.pattern = pattern.as_str(),
                    "cache.pattern_unsupported"
                );
                Ok(None)
            }
            Err(error) => {
                self.publish_failure(CacheOperation::InvalidateMatching, None, &error, timed_out, duration);
                Err(error)
            }
        }
    }

    pub(crate) async fn clear(&self) -> Result<(), Error> {
        let (result, duration, timed_out) = self.call(self.inner.clear()).await;
        match &result {
            Ok(()) => {
                self.publish(CacheOperation::Clear, CacheActivity::Ok, None, duration);
                self.publish_size();
            }
            Err(error) => self.publish_failure(CacheOperation::Clear, None, error, timed_out, duration),
        }
        result
    }

    pub(crate) async fn health_check(&self) -> Result<(), Error> {
        let (result, duration, timed_out) = self.call(self.inner.health_check()).await;
        if let Err(error) = &result {
            self.publish_failure(CacheOperation::HealthCheck, None, error, timed_out, duration);
        }
        result
    }
}
