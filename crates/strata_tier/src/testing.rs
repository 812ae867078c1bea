// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock cache tier for testing.
//!
//! This module provides `MockTier`, an in-memory tier that records all
//! operations and supports failure injection for testing error paths.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::{CacheEntry, CacheTier, Error, KeyPattern};

/// Recorded tier operation with full context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierOp {
    /// A get operation was performed with the given key.
    Get(String),
    /// An insert operation was performed with the given key and entry.
    Insert {
        /// The key that was inserted.
        key: String,
        /// The cache entry that was inserted.
        entry: CacheEntry,
    },
    /// An invalidate operation was performed with the given key.
    Invalidate(String),
    /// A pattern invalidation was performed with the given pattern source.
    InvalidateMatching(String),
    /// A clear operation was performed.
    Clear,
    /// A health check was performed.
    HealthCheck,
}

type FailPredicate = Box<dyn Fn(&TierOp) -> bool + Send + Sync>;

/// A configurable mock tier for testing.
///
/// Values are stored in memory and returned as-is; the mock does not enforce TTLs.
/// All operations are recorded for later verification, and any operation can be
/// made to fail through [`fail_when`](Self::fail_when).
///
/// # Examples
///
/// ```
/// use strata_tier::{testing::{MockTier, TierOp}, CacheTier, CacheEntry};
///
/// # futures::executor::block_on(async {
/// let tier = MockTier::new();
///
/// tier.fail_when(|op| matches!(op, TierOp::Get(k) if k == "forbidden"));
/// assert!(tier.get("forbidden").await.is_err());
/// assert!(tier.get("allowed").await.is_ok());
/// # });
/// ```
#[derive(Clone, Default)]
pub struct MockTier {
    data: Arc<Mutex<HashMap<String, CacheEntry>>>,
    operations: Arc<Mutex<Vec<TierOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
    scan_unsupported: Arc<Mutex<bool>>,
}

impl std::fmt::Debug for MockTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTier")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl MockTier {
    /// Creates a new empty mock tier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns true if the tier contains the given key.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    /// Returns the stored entry for `key` without recording an operation.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.data.lock().get(key).cloned()
    }

    /// Sets a predicate that determines when operations should fail.
    ///
    /// The predicate receives the operation and returns `true` if it should fail.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&TierOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate, allowing all operations to succeed.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Makes pattern invalidation report [`ErrorKind::Unsupported`](crate::ErrorKind::Unsupported).
    pub fn disable_scanning(&self) {
        *self.scan_unsupported.lock() = true;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<TierOp> {
        self.operations.lock().clone()
    }

    /// Returns how many recorded operations satisfy `predicate`.
    #[must_use]
    pub fn count_operations(&self, predicate: impl Fn(&TierOp) -> bool) -> usize {
        self.operations.lock().iter().filter(|op| predicate(op)).count()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn check(&self, op: TierOp) -> Result<(), Error> {
        let fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        self.operations.lock().push(op);
        if fail {
            Err(Error::unavailable("injected failure"))
        } else {
            Ok(())
        }
    }
}

impl CacheTier for MockTier {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        self.check(TierOp::Get(key.to_owned()))?;
        Ok(self.data.lock().get(key).cloned())
    }

    async fn insert(&self, key: &str, entry: CacheEntry) -> Result<(), Error> {
        self.check(TierOp::Insert {
            key: key.to_owned(),
            entry: entry.clone(),
        })?;
        self.data.lock().insert(key.to_owned(), entry);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<bool, Error> {
        self.check(TierOp::Invalidate(key.to_owned()))?;
        Ok(self.data.lock().remove(key).is_some())
    }

    async fn invalidate_matching(&self, pattern: &KeyPattern) -> Result<u64, Error> {
        self.check(TierOp::InvalidateMatching(pattern.as_str().to_owned()))?;
        if *self.scan_unsupported.lock() {
            return Err(Error::unsupported("pattern invalidation"));
        }

        let mut data = self.data.lock();
        let before = data.len();
        data.retain(|key, _| !pattern.matches(key));
        Ok((before - data.len()) as u64)
    }

    async fn clear(&self) -> Result<(), Error> {
        self.check(TierOp::Clear)?;
        self.data.lock().clear();
        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.check(TierOp::HealthCheck)
    }

    fn len(&self) -> Option<u64> {
        Some(self.data.lock().len() as u64)
    }
}
