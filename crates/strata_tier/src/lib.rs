// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Storage tier abstractions for the Strata tiered cache.
//!
//! This crate defines the [`CacheTier`] trait that every storage backend satisfies,
//! along with [`CacheEntry`] for values with expiry metadata, [`KeyPattern`] for
//! bulk invalidation and the [`Error`] type shared by all tiers.
//!
//! # Overview
//!
//! Tiers speak in string keys and opaque byte values. Typed values, strategies,
//! backfill and telemetry live one layer up in the `strata` crate, which composes
//! tiers into a chain.
//!
//! # Implementing a Cache Tier
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::RwLock;
//!
//! use strata_tier::{CacheEntry, CacheTier, Error, KeyPattern};
//!
//! struct SimpleTier(RwLock<HashMap<String, CacheEntry>>);
//!
//! impl CacheTier for SimpleTier {
//!     async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
//!         Ok(self.0.read().unwrap().get(key).cloned())
//!     }
//!
//!     async fn insert(&self, key: &str, entry: CacheEntry) -> Result<(), Error> {
//!         self.0.write().unwrap().insert(key.to_owned(), entry);
//!         Ok(())
//!     }
//!
//!     async fn invalidate(&self, key: &str) -> Result<bool, Error> {
//!         Ok(self.0.write().unwrap().remove(key).is_some())
//!     }
//!
//!     async fn invalidate_matching(&self, pattern: &KeyPattern) -> Result<u64, Error> {
//!         let mut map = self.0.write().unwrap();
//!         let before = map.len();
//!         map.retain(|key, _| !pattern.matches(key));
//!         Ok((before - map.len()) as u64)
//!     }
//!
//!     async fn clear(&self) -> Result<(), Error> {
//!         self.0.write().unwrap().clear();
//!         Ok(())
//!     }
//!
//!     async fn health_check(&self) -> Result<(), Error> {
//!         Ok(())
//!     }
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! Enable the `dynamic-cache` feature for [`DynamicTier`], which wraps any `CacheTier`
//! in a clonable type-erased container so heterogeneous backends can share one chain.

mod entry;
pub mod error;
mod kind;
mod pattern;
#[cfg(any(feature = "test-util", test))]
pub mod testing;
pub(crate) mod tier;

#[cfg(any(test, feature = "dynamic-cache"))]
mod dynamic;

#[cfg(any(test, feature = "dynamic-cache"))]
#[doc(inline)]
pub use dynamic::{DynamicTier, DynamicTierExt};
#[doc(inline)]
pub use entry::CacheEntry;
#[doc(inline)]
pub use error::{Error, ErrorKind, Result};
#[doc(inline)]
pub use kind::TierKind;
#[doc(inline)]
pub use pattern::{KeyPattern, escape_glob};
#[doc(inline)]
pub use tier::CacheTier;
