// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Distributed cache tier for Strata.
//!
//! [`DistributedTier`] adapts any [`KeyValueStore`] into a
//! [`CacheTier`](strata_tier::CacheTier). The store contract is deliberately
//! small: get, set with an optional TTL, delete, an optional glob scan and a ping.
//!
//! # Features
//!
//! - `redis`: enables [`RedisStore`], a store over a Redis connection manager.
//! - `test-util`: enables [`testing::InMemoryStore`], a recording fake with
//!   failure and hang injection.

mod envelope;
#[cfg(feature = "redis")]
mod redis_store;
mod store;
#[cfg(any(feature = "test-util", test))]
pub mod testing;
mod tier;

#[cfg(feature = "redis")]
#[doc(inline)]
pub use redis_store::RedisStore;
#[doc(inline)]
pub use store::{KeyValueStore, StoreCapabilities};
#[doc(inline)]
pub use tier::DistributedTier;
