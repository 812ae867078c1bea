// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Bounded in-process cache tier for Strata.
//!
//! [`InMemoryTier`] stores entries in a single map guarded by a mutex, with an
//! exact least-recently-used eviction order, an entry-count limit, a byte-size
//! limit and per-entry TTLs. Time comes from an injected [`tick::Clock`], so
//! expiry is fully deterministic under a controlled clock.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use strata_memory::InMemoryTier;
//! use strata_tier::{CacheEntry, CacheTier};
//! use tick::Clock;
//!
//! # async fn example(clock: &Clock) -> Result<(), strata_tier::Error> {
//! let tier = InMemoryTier::new(clock);
//! tier.insert("greeting", CacheEntry::with_ttl("hello", Duration::from_secs(60))).await?;
//! assert!(tier.get("greeting").await?.is_some());
//! # Ok(())
//! # }
//! ```

mod builder;
mod lru;
mod tier;

pub use builder::{DEFAULT_MAX_BYTES, DEFAULT_MAX_ENTRIES, DEFAULT_SWEEP_BATCH, InMemoryTierBuilder};
pub use tier::{EntryInfo, InMemoryTier, MemoryTierStats};
