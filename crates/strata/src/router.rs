// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Multi-tier cache routing.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use strata_memory::{InMemoryTier, MemoryTierStats};
use strata_monitor::{BackgroundTasks, Subscribers, SubscriptionId};
use strata_tier::{CacheEntry, Error, KeyPattern, TierKind};
use tick::Clock;

use crate::builder::CacheRouterBuilder;
use crate::dependency::DependencyGraph;
use crate::events::CacheEvent;
use crate::options::CacheOptions;
use crate::stats::TierStats;
use crate::strategy::{CacheStrategy, ResolvedStrategy, StrategyTable};
use crate::wrapper::ManagedTier;

/// Per-tier outcome of a write, delete or clear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// `(tier, succeeded)` in chain order.
    pub tiers: Vec<(TierKind, bool)>,
}

impl WriteReport {
    /// Returns `true` if every tier succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.tiers.iter().all(|(_, ok)| *ok)
    }

    /// Returns the outcome for `tier`, or `None` if it was not involved.
    #[must_use]
    pub fn succeeded(&self, tier: TierKind) -> Option<bool> {
        self.tiers.iter().find(|(kind, _)| *kind == tier).map(|(_, ok)| *ok)
    }
}

/// Result of a bulk invalidation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Entries removed, summed over tiers for pattern invalidation and
    /// counted once per key for dependency invalidation.
    pub invalidated: u64,
    /// Tier calls that failed.
    pub errors: u64,
}

/// Routes cache traffic across an ordered chain of tiers.
///
/// Reads walk the resolved chain fastest first and backfill earlier tiers on a
/// hit. Writes go to every tier in the chain. A failing tier never fails the
/// whole operation: reads treat it as a miss and writes report it per tier.
///
/// Cloning is cheap and clones share all state.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use strata::{CacheOptions, CacheRouter, CacheStrategy};
/// use strata_memory::InMemoryTier;
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let clock = Clock::new_frozen();
/// let router = CacheRouter::builder(&clock)
///     .memory(InMemoryTier::new(&clock))
///     .strategy(CacheStrategy::new("donor-list", "donor-list", Duration::from_secs(300)))
///     .build()?;
///
/// router.set("donor-list:region=NG", "[]", &CacheOptions::new()).await;
/// let value = router.get("donor-list:region=NG", &CacheOptions::new()).await;
/// assert_eq!(value.as_deref(), Some(&b"[]"[..]));
/// # Ok::<(), strata::ConfigError>(())
/// # })?;
/// # Ok::<(), strata::ConfigError>(())
/// ```
#[derive(Debug, Clone)]
pub struct CacheRouter {
    inner: Arc<RouterInner>,
}

#[derive(Debug)]
pub(crate) struct RouterInner {
    pub(crate) clock: Clock,
    pub(crate) tiers: Vec<ManagedTier>,
    pub(crate) memory: Option<InMemoryTier>,
    pub(crate) strategies: StrategyTable,
    pub(crate) dependencies: DependencyGraph,
    pub(crate) events: Arc<Subscribers<CacheEvent>>,
    pub(crate) sweep_interval: Duration,
    pub(crate) dependency_prune_interval: Duration,
}

impl CacheRouter {
    /// Starts building a router driven by `clock`.
    #[must_use]
    pub fn builder(clock: &Clock) -> CacheRouterBuilder {
        CacheRouterBuilder::new(clock)
    }

    pub(crate) fn from_inner(inner: RouterInner) -> Self {
        Self { inner: Arc::new(inner) }
    }

    fn tier(&self, kind: TierKind) -> Option<&ManagedTier> {
        self.inner.tiers.iter().find(|tier| tier.kind() == kind)
    }

    fn chain(&self, kinds: &[TierKind]) -> Vec<&ManagedTier> {
        let mut chain = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match self.tier(*kind) {
                Some(tier) if !chain.iter().any(|seen: &&ManagedTier| seen.kind() == *kind) => chain.push(tier),
                Some(_) => {}
                None => tracing::debug!(cache.tier = kind.as_str(), "cache.tier_not_configured"),
            }
        }
        chain
    }

    /// Tiers configured on this router, fastest first.
    #[must_use]
    pub fn tier_kinds(&self) -> Vec<TierKind> {
        self.inner.tiers.iter().map(ManagedTier::kind).collect()
    }

    /// The configured strategies, in priority order.
    #[must_use]
    pub fn strategies(&self) -> &[CacheStrategy] {
        self.inner.strategies.strategies()
    }

    /// The dependency index.
    #[must_use]
    pub fn dependencies(&self) -> &DependencyGraph {
        &self.inner.dependencies
    }

    /// Resolves the strategy for `raw_key`.
    ///
    /// A named strategy in `options` wins, then the first strategy whose
    /// pattern occurs in the key, then the default. Explicit TTL, tier and
    /// namespace options override the result field by field.
    #[must_use]
    pub fn resolve_strategy(&self, raw_key: &str, options: &CacheOptions) -> ResolvedStrategy {
        self.inner.strategies.resolve(raw_key, options)
    }

    /// Returns the key `raw_key` is stored under.
    #[must_use]
    pub fn cache_key(&self, raw_key: &str, options: &CacheOptions) -> String {
        self.resolve_strategy(raw_key, options).cache_key(raw_key, options)
    }

    /// Reads `raw_key`, walking the tier chain in order.
    ///
    /// On the first hit every earlier tier is backfilled at the resolved TTL.
    /// Returns `None` only if every tier misses; a failing tier counts as a miss.
    pub async fn get(&self, raw_key: &str, options: &CacheOptions) -> Option<Bytes> {
        let resolved = self.resolve_strategy(raw_key, options);
        let key = resolved.cache_key(raw_key, options);
        let chain = self.chain(&resolved.tiers);

        for (position, tier) in chain.iter().enumerate() {
            let Some(entry) = tier.get(&key).await else {
                continue;
            };

            let value = entry.into_value();
            if position > 0 {
                let backfill = CacheEntry::with_cached_at(value.clone(), self.inner.clock.system_time(), Some(resolved.ttl));
                join_all(chain[..position].iter().map(|earlier| earlier.insert(&key, backfill.clone(), true))).await;
                // The backfilled copies outlive the original write.
                self.inner.dependencies.extend(&key, backfill.expires_at());
            }
            return Some(value);
        }

        None
    }

    /// Writes `value` under `raw_key` to every tier in the resolved chain.
    ///
    /// Dependencies named in `options` are registered against the composed
    /// key whether or not the tiers accepted the write.
    pub async fn set(&self, raw_key: &str, value: impl Into<Bytes>, options: &CacheOptions) -> WriteReport {
        let resolved = self.resolve_strategy(raw_key, options);
        let key = resolved.cache_key(raw_key, options);
        let now = self.inner.clock.system_time();
        let entry = CacheEntry::with_cached_at(value, now, Some(resolved.ttl));

        let chain = self.chain(&resolved.tiers);
        let outcomes = join_all(chain.iter().map(|tier| tier.insert(&key, entry.clone(), false))).await;

        let expires_at = entry.expires_at();
        for entity in &options.dependencies {
            self.inner.dependencies.add(entity, &key, expires_at);
        }

        WriteReport {
            tiers: chain.iter().map(|tier| tier.kind()).zip(outcomes).collect(),
        }
    }

    /// Removes `raw_key` from every configured tier.
    ///
    /// A tier that did not hold the key still reports success.
    pub async fn delete(&self, raw_key: &str, options: &CacheOptions) -> WriteReport {
        let key = self.cache_key(raw_key, options);
        let outcomes = join_all(self.inner.tiers.iter().map(|tier| tier.invalidate(&key))).await;
        WriteReport {
            tiers: self
                .inner
                .tiers
                .iter()
                .map(ManagedTier::kind)
                .zip(outcomes.iter().map(Result::is_ok))
                .collect(),
        }
    }

    /// Removes every stored key matching `pattern` from every tier.
    ///
    /// Patterns containing `*` are globs over the whole key; anything else
    /// matches as a substring. Tiers that cannot scan are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error of kind [`ErrorKind::InvalidPattern`](strata_tier::ErrorKind::InvalidPattern)
    /// if `pattern` is rejected. Tier failures are counted, not returned.
    pub async fn invalidate(&self, pattern: &str) -> Result<InvalidationReport, Error> {
        let pattern = KeyPattern::parse(pattern)?;
        let outcomes = join_all(self.inner.tiers.iter().map(|tier| tier.invalidate_matching(&pattern))).await;

        let mut report = InvalidationReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(removed) => report.invalidated += removed.unwrap_or(0),
                Err(_) => report.errors += 1,
            }
        }

        tracing::info!(
            cache.pattern = pattern.as_str(),
            cache.invalidated = report.invalidated,
            cache.errors = report.errors,
            "cache.invalidate_pattern"
        );
        Ok(report)
    }

    /// Removes every key registered under `entity` and drops the edge set.
    ///
    /// Idempotent: a second call finds no edges and does nothing.
    pub async fn invalidate_by_dependency(&self, entity: &str) -> InvalidationReport {
        let keys = self.inner.dependencies.take(entity);
        let mut report = InvalidationReport::default();

        for key in &keys {
            let outcomes = join_all(self.inner.tiers.iter().map(|tier| tier.invalidate(key))).await;
            let mut removed = false;
            for outcome in outcomes {
                match outcome {
                    Ok(present) => removed |= present,
                    Err(_) => report.errors += 1,
                }
            }
            if removed {
                report.invalidated += 1;
            }
        }

        tracing::info!(
            cache.entity = entity,
            cache.keys = keys.len(),
            cache.invalidated = report.invalidated,
            "cache.invalidate_dependency"
        );
        report
    }

    /// Returns the cached value or computes, stores and returns it.
    ///
    /// # Errors
    ///
    /// Returns the loader's error; nothing is stored in that case.
    pub async fn get_or_insert_with<F, Fut, E>(&self, raw_key: &str, options: &CacheOptions, loader: F) -> Result<Bytes, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        if let Some(value) = self.get(raw_key, options).await {
            return Ok(value);
        }

        let value = loader().await?;
        let _ = self.set(raw_key, value.clone(), options).await;
        Ok(value)
    }

    /// Empties every tier. Dependency edges are dropped as well.
    pub async fn clear(&self) -> WriteReport {
        let outcomes = join_all(self.inner.tiers.iter().map(ManagedTier::clear)).await;
        self.inner.dependencies.clear();
        WriteReport {
            tiers: self
                .inner
                .tiers
                .iter()
                .map(ManagedTier::kind)
                .zip(outcomes.iter().map(Result::is_ok))
                .collect(),
        }
    }

    /// Probes every tier, fastest first.
    pub async fn tier_availability(&self) -> Vec<(TierKind, bool)> {
        let outcomes = join_all(self.inner.tiers.iter().map(ManagedTier::health_check)).await;
        self.inner
            .tiers
            .iter()
            .map(ManagedTier::kind)
            .zip(outcomes.iter().map(Result::is_ok))
            .collect()
    }

    /// Per-tier counters, fastest first.
    #[must_use]
    pub fn stats(&self) -> Vec<TierStats> {
        self.inner.tiers.iter().map(ManagedTier::stats).collect()
    }

    /// Counters of the memory tier, if one is configured.
    #[must_use]
    pub fn memory_stats(&self) -> Option<MemoryTierStats> {
        self.inner.memory.as_ref().map(InMemoryTier::stats)
    }

    /// Removes expired entries from the memory tier.
    pub fn sweep_expired(&self) -> u64 {
        self.inner.memory.as_ref().map_or(0, InMemoryTier::sweep_expired)
    }

    /// Drops dependency edges whose keys have expired everywhere.
    pub fn prune_dependencies(&self) -> usize {
        let removed = self.inner.dependencies.prune(self.inner.clock.system_time());
        if removed > 0 {
            tracing::debug!(cache.edges_removed = removed, "cache.dependency_prune");
        }
        removed
    }

    /// Registers `listener` for every tier event.
    pub fn subscribe(&self, listener: impl Fn(&CacheEvent) + Send + Sync + 'static) -> SubscriptionId {
        self.inner.events.subscribe(listener)
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Spawns the memory sweep and dependency prune on the ambient Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use = "dropping the handle stops the tasks"]
    pub fn start_background(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();
        let clock = &self.inner.clock;

        if self.inner.memory.is_some() {
            let router = self.clone();
            tasks.spawn_periodic("cache_sweep", clock, self.inner.sweep_interval, move || {
                router.sweep_expired();
                async {}
            });
        }

        let router = self.clone();
        tasks.spawn_periodic("dependency_prune", clock, self.inner.dependency_prune_interval, move || {
            router.prune_dependencies();
            async {}
        });

        tasks
    }
}
