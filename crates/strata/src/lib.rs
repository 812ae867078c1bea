// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Tiered caching with dependency invalidation and built-in performance monitoring.
//!
//! The crate has two entry points:
//!
//! - [`CacheRouter`] routes reads and writes across an ordered chain of cache
//!   tiers, fastest first. Reads backfill faster tiers on a hit. Writes can
//!   register dependency edges so that every key derived from an entity can be
//!   invalidated at once. A failing tier degrades to a miss and never fails the
//!   caller.
//! - [`Strata`] pairs a router with a [`PerformanceMonitor`](strata_monitor::PerformanceMonitor),
//!   turns cache events into custom metrics, and answers health checks.
//!
//! Which TTL and tier chain a key uses is decided by a [`CacheStrategy`]:
//! the first strategy whose pattern occurs in the raw key wins, unless the
//! caller names a strategy in [`CacheOptions`].
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use strata::{CacheOptions, CacheRouter, CacheStrategy};
//! use strata_distributed::{DistributedTier, testing::InMemoryStore};
//! use strata_memory::InMemoryTier;
//! use strata_tier::TierKind;
//! use tick::Clock;
//!
//! # futures::executor::block_on(async {
//! let clock = Clock::new_frozen();
//! let router = CacheRouter::builder(&clock)
//!     .memory(InMemoryTier::new(&clock))
//!     .distributed(DistributedTier::new(InMemoryStore::new(), &clock))
//!     .strategy(
//!         CacheStrategy::new("donor-list", "donor-list", Duration::from_secs(300))
//!             .tiers([TierKind::Memory, TierKind::Distributed]),
//!     )
//!     .build()?;
//!
//! let options = CacheOptions::new().depends_on("donor:42");
//! router.set("donor-list:region=NG", "[42]", &options).await;
//!
//! let report = router.invalidate_by_dependency("donor:42").await;
//! assert_eq!(report.invalidated, 1);
//! assert!(router.get("donor-list:region=NG", &CacheOptions::new()).await.is_none());
//! # Ok::<(), strata::ConfigError>(())
//! # })?;
//! # Ok::<(), strata::ConfigError>(())
//! ```
//!
//! # Features
//!
//! - `metrics` (default): records cache and monitor instruments through an
//!   OpenTelemetry meter provider.
//! - `redis`: enables the Redis-backed distributed store.
//! - `test-util`: enables the test doubles of the tier crates.

mod builder;
mod config;
mod dependency;
mod error;
mod events;
mod health;
mod integration;
mod key;
mod options;
mod router;
mod stats;
mod strategy;
mod telemetry;
mod wrapper;

pub use builder::{CacheRouterBuilder, DEFAULT_DEPENDENCY_PRUNE_INTERVAL, DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL};
pub use config::{CacheConfig, DistributedConfig, MemoryConfig, StrataConfig, StrategyConfig};
pub use dependency::DependencyGraph;
pub use error::{Aborted, ConfigError};
pub use events::{CacheActivity, CacheEvent, CacheOperation};
pub use health::{HealthSnapshot, HealthStatus};
pub use integration::{Strata, StrataBuilder};
pub use key::{KeyParts, build_cache_key, params_hash};
pub use options::CacheOptions;
pub use router::{CacheRouter, InvalidationReport, WriteReport};
pub use stats::TierStats;
pub use strategy::{CacheStrategy, DEFAULT_STRATEGY, ResolvedStrategy};
#[doc(no_inline)]
pub use strata_tier::{CacheEntry, CacheTier, Error, ErrorKind, KeyPattern, TierKind};
