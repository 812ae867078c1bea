// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The core trait for cache storage backends.
//!
//! [`CacheTier`] defines the interface that all storage backends implement.
//! The router in `strata` wraps tiers to add telemetry, timeouts and backfill.

use crate::{CacheEntry, Error, KeyPattern};

/// Trait for cache tier implementations.
///
/// Keys are composed cache keys, values are opaque bytes. A tier owns its own copy
/// of every entry it stores.
///
/// Tiers that cannot enumerate their keys return an error of kind
/// [`ErrorKind::Unsupported`](crate::ErrorKind::Unsupported) from
/// [`invalidate_matching`](Self::invalidate_matching); callers treat that as a no-op.
#[cfg_attr(
    any(test, feature = "dynamic-cache"),
    dynosaur::dynosaur(pub(crate) DynCacheTier = dyn(box) CacheTier, bridge(none))
)]
pub trait CacheTier: Send + Sync {
    /// Gets an entry, returning `None` when the key is absent or expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<CacheEntry>, Error>> + Send;

    /// Inserts an entry, replacing any previous entry for the key.
    fn insert(&self, key: &str, entry: CacheEntry) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes an entry, returning whether it was present.
    fn invalidate(&self, key: &str) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Removes every entry whose key matches `pattern`, returning how many were removed.
    fn invalidate_matching(&self, pattern: &KeyPattern) -> impl Future<Output = Result<u64, Error>> + Send;

    /// Clears all entries.
    fn clear(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Checks that the tier is able to serve requests.
    fn health_check(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Returns the number of entries, if supported.
    ///
    /// Returns `None` for implementations that don't track size.
    fn len(&self) -> Option<u64> {
        None
    }

    /// Returns `true` if the tier contains no entries.
    ///
    /// Returns `None` for implementations that don't track size.
    fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }
}
