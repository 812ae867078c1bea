// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Dynamic cache tier wrapper for type erasure.

use std::{fmt::Debug, sync::Arc};

use crate::{CacheEntry, CacheTier, Error, KeyPattern, tier::DynCacheTier};

/// Extension trait for converting any `CacheTier` into a `DynamicTier`.
///
/// This trait is automatically implemented for all types that implement `CacheTier`.
pub trait DynamicTierExt: Sized {
    /// Converts this cache tier into a `DynamicTier`.
    fn into_dynamic(self) -> DynamicTier;
}

impl<T> DynamicTierExt for T
where
    T: CacheTier + 'static,
{
    fn into_dynamic(self) -> DynamicTier {
        DynamicTier::new(self)
    }
}

/// A clonable cache tier with type erasure.
///
/// `DynamicTier` wraps a trait object in an `Arc` so the router can hold memory,
/// distributed and mock tiers side by side.
pub struct DynamicTier(Arc<DynCacheTier<'static>>);

impl DynamicTier {
    /// Creates a new dynamic tier from any `CacheTier` implementation.
    pub fn new<T>(tier: T) -> Self
    where
        T: CacheTier + 'static,
    {
        Self(DynCacheTier::new_arc(tier))
    }
}

impl Debug for DynamicTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicTier").finish()
    }
}

impl Clone for DynamicTier {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl CacheTier for DynamicTier {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        self.0.get(key).await
    }

    async fn insert(&self, key: &str, entry: CacheEntry) -> Result<(), Error> {
        self.0.insert(key, entry).await
    }

    async fn invalidate(&self, key: &str) -> Result<bool, Error> {
        self.0.invalidate(key).await
    }

    async fn invalidate_matching(&self, pattern: &KeyPattern) -> Result<u64, Error> {
        self.0.invalidate_matching(pattern).await
    }

    async fn clear(&self) -> Result<(), Error> {
        self.0.clear().await
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.0.health_check().await
    }

    fn len(&self) -> Option<u64> {
        self.0.len()
    }

    fn is_empty(&self) -> Option<bool> {
        self.0.is_empty()
    }
}
