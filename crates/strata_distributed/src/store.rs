// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The capability contract for external key/value services.

use std::time::Duration;

use bytes::Bytes;
use strata_tier::Error;

/// Optional features a [`KeyValueStore`] may offer.
///
/// # Examples
///
/// ```
/// use strata_distributed::StoreCapabilities;
///
/// let caps = StoreCapabilities::new().with_native_ttl().with_scan();
/// assert!(caps.native_ttl());
/// assert!(caps.scan());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCapabilities {
    native_ttl: bool,
    scan: bool,
}

impl StoreCapabilities {
    /// Capabilities of a store that supports neither expiry nor scanning.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            native_ttl: false,
            scan: false,
        }
    }

    /// Marks the store as expiring keys on its own.
    #[must_use]
    pub const fn with_native_ttl(mut self) -> Self {
        self.native_ttl = true;
        self
    }

    /// Marks the store as able to enumerate keys by glob.
    #[must_use]
    pub const fn with_scan(mut self) -> Self {
        self.scan = true;
        self
    }

    /// Whether the store expires keys on its own.
    #[must_use]
    pub const fn native_ttl(self) -> bool {
        self.native_ttl
    }

    /// Whether the store can enumerate keys by glob.
    #[must_use]
    pub const fn scan(self) -> bool {
        self.scan
    }
}

/// An external key/value service used as a cache tier.
///
/// Every call may fail; the tier maps failures to misses on read and to
/// non-fatal tier failures on write.
pub trait KeyValueStore: Send + Sync {
    /// Fetches the bytes stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Bytes>, Error>> + Send;

    /// Stores `value` under `key`.
    ///
    /// `ttl` is only passed when [`StoreCapabilities::native_ttl`] is set. Stores
    /// with second granularity round it up.
    fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes `key`, returning whether it existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Lists keys matching a glob where `*` matches any run of characters.
    ///
    /// Only called when [`StoreCapabilities::scan`] is set.
    fn scan_keys(&self, glob: &str) -> impl Future<Output = Result<Vec<String>, Error>> + Send;

    /// Verifies the store is reachable.
    fn ping(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Reports which optional features the store supports.
    fn capabilities(&self) -> StoreCapabilities;
}
