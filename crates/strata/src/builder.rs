// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for [`CacheRouter`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "metrics")]
use opentelemetry::metrics::MeterProvider;
use strata_memory::InMemoryTier;
use strata_monitor::Subscribers;
use strata_tier::{CacheTier, DynamicTier, TierKind};
use tick::Clock;

use crate::ConfigError;
use crate::dependency::DependencyGraph;
use crate::router::{CacheRouter, RouterInner};
use crate::strategy::{CacheStrategy, StrategyTable};
use crate::telemetry::CacheTelemetry;
use crate::wrapper::ManagedTier;

/// TTL of the fallback strategy unless configured otherwise.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Interval of the memory-tier expiry sweep unless configured otherwise.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Interval of the dependency prune unless configured otherwise.
pub const DEFAULT_DEPENDENCY_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Builds a [`CacheRouter`].
///
/// At least one tier is required. Tiers are ordered fastest first regardless
/// of the order they are added in. Adding a tier of a kind that is already
/// present replaces it.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use strata::{CacheRouter, CacheStrategy};
/// use strata_distributed::{DistributedTier, testing::InMemoryStore};
/// use strata_memory::InMemoryTier;
/// use strata_tier::TierKind;
/// use tick::Clock;
///
/// let clock = Clock::new_frozen();
/// let router = CacheRouter::builder(&clock)
///     .memory(InMemoryTier::builder(&clock).max_entries(1_000).build())
///     .distributed(DistributedTier::new(InMemoryStore::new(), &clock))
///     .timeout(TierKind::Distributed, Duration::from_millis(250))
///     .strategy(
///         CacheStrategy::new("donor-list", "donor-list", Duration::from_secs(300))
///             .tiers([TierKind::Memory, TierKind::Distributed]),
///     )
///     .build()?;
///
/// assert_eq!(router.tier_kinds(), [TierKind::Memory, TierKind::Distributed]);
/// # Ok::<(), strata::ConfigError>(())
/// ```
#[derive(Debug)]
pub struct CacheRouterBuilder {
    clock: Clock,
    tiers: BTreeMap<TierKind, DynamicTier>,
    timeouts: BTreeMap<TierKind, Duration>,
    memory: Option<InMemoryTier>,
    strategies: Vec<CacheStrategy>,
    default_ttl: Duration,
    default_tiers: Vec<TierKind>,
    sweep_interval: Duration,
    dependency_prune_interval: Duration,
    telemetry: CacheTelemetry,
}

impl CacheRouterBuilder {
    pub(crate) fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            tiers: BTreeMap::new(),
            timeouts: BTreeMap::new(),
            memory: None,
            strategies: Vec::new(),
            default_ttl: DEFAULT_TTL,
            default_tiers: vec![TierKind::Memory],
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            dependency_prune_interval: DEFAULT_DEPENDENCY_PRUNE_INTERVAL,
            telemetry: CacheTelemetry::default(),
        }
    }

    /// Uses `tier` as the memory tier. Its expiry sweep runs as a background task.
    #[must_use]
    pub fn memory(mut self, tier: InMemoryTier) -> Self {
        self.memory = Some(tier.clone());
        self.tiers.insert(TierKind::Memory, DynamicTier::new(tier));
        self
    }

    /// Uses `tier` as the distributed tier.
    #[must_use]
    pub fn distributed(mut self, tier: impl CacheTier + 'static) -> Self {
        self.tiers.insert(TierKind::Distributed, DynamicTier::new(tier));
        self
    }

    /// Uses any tier implementation for `kind`.
    ///
    /// A memory tier added this way is not swept by the router.
    #[must_use]
    pub fn tier(mut self, kind: TierKind, tier: impl CacheTier + 'static) -> Self {
        if kind == TierKind::Memory {
            self.memory = None;
        }
        self.tiers.insert(kind, DynamicTier::new(tier));
        self
    }

    /// Bounds every call to the `kind` tier. Timed-out reads are misses and
    /// timed-out writes are reported as failures.
    ///
    /// The tier may be added before or after this call.
    #[must_use]
    pub fn timeout(mut self, kind: TierKind, timeout: Duration) -> Self {
        self.timeouts.insert(kind, timeout);
        self
    }

    /// Appends a strategy. Earlier strategies take priority.
    #[must_use]
    pub fn strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Appends several strategies in priority order.
    #[must_use]
    pub fn strategies(mut self, strategies: impl IntoIterator<Item = CacheStrategy>) -> Self {
        self.strategies.extend(strategies);
        self
    }

    /// Sets the TTL and tier chain used when no strategy matches.
    ///
    /// Defaults to [`DEFAULT_TTL`] in the memory tier.
    #[must_use]
    pub fn default_strategy(mut self, ttl: Duration, tiers: impl IntoIterator<Item = TierKind>) -> Self {
        self.default_ttl = ttl;
        self.default_tiers = tiers.into_iter().collect();
        self
    }

    /// Sets how often the memory tier is swept for expired entries.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets how often expired dependency edges are dropped.
    #[must_use]
    pub fn dependency_prune_interval(mut self, interval: Duration) -> Self {
        self.dependency_prune_interval = interval;
        self
    }

    /// Records tier events, durations and sizes through `provider`.
    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn meter_provider(mut self, provider: &dyn MeterProvider) -> Self {
        self.telemetry = CacheTelemetry::new(provider);
        self
    }

    /// Validates the configuration and builds the router.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if no tier is configured, a strategy is
    /// invalid or refers to a missing tier, or an interval or timeout is zero.
    pub fn build(self) -> Result<CacheRouter, ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::invalid("at least one tier is required"));
        }
        for (kind, timeout) in &self.timeouts {
            if !self.tiers.contains_key(kind) {
                return Err(ConfigError::invalid(format!("timeout set for the {kind} tier, which is not configured")));
            }
            if timeout.is_zero() {
                return Err(ConfigError::invalid(format!("the {kind} tier timeout must be greater than zero")));
            }
        }
        if self.sweep_interval.is_zero() || self.dependency_prune_interval.is_zero() {
            return Err(ConfigError::invalid("background intervals must be greater than zero"));
        }

        let registered: Vec<TierKind> = self.tiers.keys().copied().collect();
        let strategies = StrategyTable::new(self.strategies, self.default_ttl, self.default_tiers);
        strategies.validate(&registered)?;

        let events = Arc::new(Subscribers::default());
        let tiers = self
            .tiers
            .into_iter()
            .map(|(kind, tier)| {
                ManagedTier::new(
                    kind,
                    tier,
                    self.timeouts.get(&kind).copied(),
                    self.clock.clone(),
                    self.telemetry.clone(),
                    Arc::clone(&events),
                )
            })
            .collect();

        Ok(CacheRouter::from_inner(RouterInner {
            clock: self.clock,
            tiers,
            memory: self.memory,
            strategies,
            dependencies: DependencyGraph::new(),
            events,
            sweep_interval: self.sweep_interval,
            dependency_prune_interval: self.dependency_prune_interval,
        }))
    }
}
