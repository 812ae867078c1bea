// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Strategy table and per-key resolution.

use std::collections::HashSet;
use std::time::Duration;

use strata_tier::TierKind;

use crate::ConfigError;
use crate::key::{KeyParts, build_cache_key, params_hash};
use crate::options::CacheOptions;

/// Name of the fallback strategy.
pub const DEFAULT_STRATEGY: &str = "default";

/// TTL and tier chain applied to keys matching a pattern.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use strata::CacheStrategy;
/// use strata_tier::TierKind;
///
/// let strategy = CacheStrategy::new("donor-list", "donor-list", Duration::from_secs(300))
///     .tiers([TierKind::Memory, TierKind::Distributed]);
/// assert!(strategy.matches("donor-list:region=NG"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStrategy {
    name: String,
    key_pattern: String,
    ttl: Duration,
    tiers: Vec<TierKind>,
    namespace: Option<String>,
}

impl CacheStrategy {
    /// Creates a memory-only strategy for keys containing `key_pattern`.
    pub fn new(name: impl Into<String>, key_pattern: impl Into<String>, ttl: Duration) -> Self {
        Self {
            name: name.into(),
            key_pattern: key_pattern.into(),
            ttl,
            tiers: vec![TierKind::Memory],
            namespace: None,
        }
    }

    /// Sets the tier chain, fastest first.
    #[must_use]
    pub fn tiers(mut self, tiers: impl IntoIterator<Item = TierKind>) -> Self {
        self.tiers = tiers.into_iter().collect();
        self
    }

    /// Prefixes keys resolved to this strategy with `namespace:`.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// The strategy name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The substring matched against raw keys.
    #[must_use]
    pub fn key_pattern(&self) -> &str {
        &self.key_pattern
    }

    /// The entry TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The tier chain, fastest first.
    #[must_use]
    pub fn tier_chain(&self) -> &[TierKind] {
        &self.tiers
    }

    /// The namespace prepended to resolved keys, if any.
    #[must_use]
    pub fn namespace_prefix(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Returns `true` if `raw_key` contains the key pattern. Prefixes match as a special case.
    #[must_use]
    pub fn matches(&self, raw_key: &str) -> bool {
        raw_key.contains(&self.key_pattern)
    }

    fn validate(&self, registered: &[TierKind]) -> Result<(), ConfigError> {
        if self.ttl.is_zero() {
            return Err(ConfigError::invalid(format!("strategy {} has a zero TTL", self.name)));
        }
        if self.tiers.is_empty() {
            return Err(ConfigError::invalid(format!("strategy {} has an empty tier chain", self.name)));
        }
        if let Some(missing) = self.tiers.iter().find(|kind| !registered.contains(kind)) {
            return Err(ConfigError::invalid(format!(
                "strategy {} uses the {missing} tier, which is not configured",
                self.name
            )));
        }
        Ok(())
    }
}

/// A strategy after overrides were applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStrategy {
    /// Name of the strategy the key resolved to.
    pub name: String,
    /// Effective TTL.
    pub ttl: Duration,
    /// Effective tier chain, fastest first.
    pub tiers: Vec<TierKind>,
    /// Effective namespace.
    pub namespace: Option<String>,
}

impl ResolvedStrategy {
    /// Composes the stored key for `raw_key` under this strategy.
    #[must_use]
    pub fn cache_key(&self, raw_key: &str, options: &CacheOptions) -> String {
        let hash = params_hash(&options.params);
        build_cache_key(
            raw_key,
            &KeyParts {
                namespace: self.namespace.as_deref(),
                version: options.version,
                params_hash: hash.as_deref(),
            },
        )
    }
}

/// Ordered strategy list with a fallback. Insertion order is priority order.
#[derive(Debug, Clone)]
pub(crate) struct StrategyTable {
    strategies: Vec<CacheStrategy>,
    fallback: CacheStrategy,
}

impl StrategyTable {
    pub(crate) fn new(strategies: Vec<CacheStrategy>, default_ttl: Duration, default_tiers: Vec<TierKind>) -> Self {
        Self {
            strategies,
            fallback: CacheStrategy::new(DEFAULT_STRATEGY, "", default_ttl).tiers(default_tiers),
        }
    }

    pub(crate) fn validate(&self, registered: &[TierKind]) -> Result<(), ConfigError> {
        self.fallback.validate(registered)?;

        let mut names = HashSet::new();
        for strategy in &self.strategies {
            if strategy.key_pattern.is_empty() {
                return Err(ConfigError::invalid(format!("strategy {} has an empty key pattern", strategy.name)));
            }
            if strategy.name == DEFAULT_STRATEGY || !names.insert(strategy.name.as_str()) {
                return Err(ConfigError::invalid(format!("strategy name {} is used twice", strategy.name)));
            }
            strategy.validate(registered)?;
        }
        Ok(())
    }

    pub(crate) fn strategies(&self) -> &[CacheStrategy] {
        &self.strategies
    }

    pub(crate) fn resolve(&self, raw_key: &str, options: &CacheOptions) -> ResolvedStrategy {
        let named = options.strategy.as_deref().and_then(|name| {
            let found = self.strategies.iter().find(|strategy| strategy.name == name);
            if found.is_none() && name != DEFAULT_STRATEGY {
                tracing::debug!(cache.strategy = name, "cache.strategy_unknown");
            }
            found
        });

        let base = named
            .or_else(|| self.strategies.iter().find(|strategy| strategy.matches(raw_key)))
            .unwrap_or(&self.fallback);

        ResolvedStrategy {
            name: base.name.clone(),
            ttl: options.ttl.unwrap_or(base.ttl),
            tiers: options.tiers.clone().unwrap_or_else(|| base.tiers.clone()),
            namespace: options.namespace.clone().or_else(|| base.namespace.clone()),
        }
    }
}
