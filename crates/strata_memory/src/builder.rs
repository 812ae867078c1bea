// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring in-memory tiers.

use tick::Clock;

use crate::tier::InMemoryTier;

/// Default entry limit.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default byte limit (100 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// Default number of entries a sweep removes per lock acquisition.
pub const DEFAULT_SWEEP_BATCH: usize = 256;

/// Builder for configuring an [`InMemoryTier`].
///
/// # Examples
///
/// ```
/// use strata_memory::InMemoryTier;
/// use tick::Clock;
///
/// # fn example(clock: &Clock) {
/// let tier = InMemoryTier::builder(clock)
///     .max_entries(500)
///     .sweep_batch_size(64)
///     .build();
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryTierBuilder {
    pub(crate) clock: Clock,
    pub(crate) max_entries: usize,
    pub(crate) max_bytes: u64,
    pub(crate) sweep_batch: usize,
    pub(crate) name: Option<String>,
}

impl InMemoryTierBuilder {
    pub(crate) fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes: DEFAULT_MAX_BYTES,
            sweep_batch: DEFAULT_SWEEP_BATCH,
            name: None,
        }
    }

    /// Sets the maximum number of entries. Values below one are raised to one.
    #[must_use]
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Sets the maximum estimated size of all stored entries, in bytes.
    #[must_use]
    pub fn max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Sets how many entries a sweep processes per lock acquisition.
    #[must_use]
    pub fn sweep_batch_size(mut self, batch: usize) -> Self {
        self.sweep_batch = batch.max(1);
        self
    }

    /// Sets a name used in logs.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builds the tier.
    #[must_use]
    pub fn build(self) -> InMemoryTier {
        InMemoryTier::from_builder(self)
    }
}
