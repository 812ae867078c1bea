// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::time::Duration;

use strata_tier::TierKind;

/// Per-call cache options.
///
/// Every field is optional. Explicit values override the resolved strategy
/// field by field; everything else comes from the strategy.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use strata::CacheOptions;
///
/// let options = CacheOptions::new()
///     .strategy("donor-list")
///     .ttl(Duration::from_secs(60))
///     .param("region", "NG")
///     .depends_on("donor:42");
/// assert_eq!(options.dependencies(), ["donor:42"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    pub(crate) strategy: Option<String>,
    pub(crate) ttl: Option<Duration>,
    pub(crate) tiers: Option<Vec<TierKind>>,
    pub(crate) namespace: Option<String>,
    pub(crate) version: Option<u32>,
    pub(crate) params: BTreeMap<String, String>,
    pub(crate) dependencies: Vec<String>,
}

impl CacheOptions {
    /// Creates options that defer entirely to strategy resolution.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects a strategy by name instead of by key pattern.
    #[must_use]
    pub fn strategy(mut self, name: impl Into<String>) -> Self {
        self.strategy = Some(name.into());
        self
    }

    /// Overrides the TTL.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Overrides the tier chain.
    #[must_use]
    pub fn tiers(mut self, tiers: impl IntoIterator<Item = TierKind>) -> Self {
        self.tiers = Some(tiers.into_iter().collect());
        self
    }

    /// Overrides the key namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Appends a `:vN` suffix to the composed key.
    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Adds a parameter folded into the key's parameter hash.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Registers the written key under `entity` in the dependency graph.
    ///
    /// Only meaningful for writes.
    #[must_use]
    pub fn depends_on(mut self, entity: impl Into<String>) -> Self {
        self.dependencies.push(entity.into());
        self
    }

    /// Entities the written key depends on.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}
