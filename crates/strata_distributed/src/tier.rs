// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::Debug;

use strata_tier::{CacheEntry, CacheTier, Error, KeyPattern, escape_glob};
use tick::Clock;

use crate::envelope;
use crate::store::KeyValueStore;

/// A cache tier backed by an external [`KeyValueStore`].
///
/// Values are framed with their insertion time and TTL, so expiry is enforced on
/// read even when the store has no native expiry. When it does, the TTL is also
/// handed to the store so abandoned keys are reclaimed server-side.
///
/// An optional key prefix isolates this tier's keys inside a shared store.
///
/// # Examples
///
/// ```
/// use strata_distributed::{DistributedTier, KeyValueStore};
/// use tick::Clock;
///
/// fn build<S: KeyValueStore>(store: S, clock: &Clock) -> DistributedTier<S> {
///     DistributedTier::new(store, clock).with_key_prefix("strata:")
/// }
/// ```
pub struct DistributedTier<S> {
    store: S,
    clock: Clock,
    prefix: Option<String>,
}

impl<S> DistributedTier<S> {
    /// Creates a tier over `store`.
    pub fn new(store: S, clock: &Clock) -> Self {
        Self {
            store,
            clock: clock.clone(),
            prefix: None,
        }
    }

    /// Prepends `prefix` to every key written to the store.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn storage_key<'a>(&self, key: &'a str) -> Cow<'a, str> {
        match &self.prefix {
            Some(prefix) => Cow::Owned(format!("{prefix}{key}")),
            None => Cow::Borrowed(key),
        }
    }

    /// Store glob for `glob` under the prefix, which is matched literally.
    fn scan_glob(&self, glob: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{glob}", escape_glob(prefix)),
            None => glob.to_owned(),
        }
    }

    fn logical_key<'a>(&self, stored: &'a str) -> Option<&'a str> {
        match &self.prefix {
            Some(prefix) => stored.strip_prefix(prefix.as_str()),
            None => Some(stored),
        }
    }
}

impl<S: KeyValueStore> DistributedTier<S> {
    async fn delete_all(&self, glob: &str, pattern: Option<&KeyPattern>) -> Result<u64, Error> {
        if !self.store.capabilities().scan() {
            return Err(Error::unsupported("key scanning"));
        }

        let mut removed = 0_u64;
        for stored in self.store.scan_keys(glob).await? {
            let Some(key) = self.logical_key(&stored) else {
                continue;
            };

            if pattern.is_some_and(|pattern| !pattern.matches(key)) {
                continue;
            }

            match self.store.delete(&stored).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "cache.distributed.delete_failed"),
            }
        }

        Ok(removed)
    }
}

impl<S> Debug for DistributedTier<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedTier")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl<S: KeyValueStore> CacheTier for DistributedTier<S> {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let storage_key = self.storage_key(key);
        let Some(bytes) = self.store.get(&storage_key).await? else {
            return Ok(None);
        };

        let entry = envelope::decode(bytes)?;
        if entry.is_expired_at(self.clock.system_time()) {
            if let Err(e) = self.store.delete(&storage_key).await {
                tracing::debug!(error = %e, "cache.distributed.expired_delete_failed");
            }
            return Ok(None);
        }

        Ok(Some(entry))
    }

    async fn insert(&self, key: &str, mut entry: CacheEntry) -> Result<(), Error> {
        entry.ensure_cached_at(self.clock.system_time());
        let ttl = if self.store.capabilities().native_ttl() { entry.ttl() } else { None };
        let payload = envelope::encode(&entry);
        self.store.set(&self.storage_key(key), payload, ttl).await
    }

    async fn invalidate(&self, key: &str) -> Result<bool, Error> {
        self.store.delete(&self.storage_key(key)).await
    }

    async fn invalidate_matching(&self, pattern: &KeyPattern) -> Result<u64, Error> {
        let glob = self.scan_glob(&pattern.to_glob());
        self.delete_all(&glob, Some(pattern)).await
    }

    async fn clear(&self) -> Result<(), Error> {
        let glob = self.scan_glob("*");
        self.delete_all(&glob, None).await.map(|_| ())
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.store.ping().await
    }
}
