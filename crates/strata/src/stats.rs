// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicU64, Ordering};

use strata_tier::TierKind;

use crate::events::{CacheActivity, CacheOperation};

/// Per-tier counters reported by [`CacheRouter::stats`](crate::CacheRouter::stats).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct TierStats {
    /// The tier these counters belong to.
    pub tier: TierKind,
    /// Lookups that returned a live entry.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Successful caller writes.
    pub writes: u64,
    /// Successful backfills.
    pub backfills: u64,
    /// Successful single-key removals.
    pub deletes: u64,
    /// Failed calls, including timeouts.
    pub errors: u64,
    /// Calls that hit the tier timeout.
    pub timeouts: u64,
    /// Entries currently held, if the tier tracks it.
    pub entries: Option<u64>,
}

impl TierStats {
    /// `hits / (hits + misses)`, or zero before the first lookup.
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            #[expect(clippy::cast_precision_loss, reason = "ratio of counters")]
            let ratio = self.hits as f64 / lookups as f64;
            ratio
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    backfills: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
}

impl TierCounters {
    pub(crate) fn count(&self, operation: CacheOperation, activity: CacheActivity) {
        let counter = match (operation, activity) {
            (_, CacheActivity::Hit) => &self.hits,
            (_, CacheActivity::Miss | CacheActivity::Expired) => &self.misses,
            (_, CacheActivity::Inserted) => &self.writes,
            (_, CacheActivity::Backfilled) => &self.backfills,
            (CacheOperation::Invalidate, CacheActivity::Invalidated) => &self.deletes,
            (_, CacheActivity::Timeout) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                &self.errors
            }
            (_, CacheActivity::Error) => &self.errors,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, tier: TierKind, entries: Option<u64>) -> TierStats {
        TierStats {
            tier,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            backfills: self.backfills.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            entries,
        }
    }
}
