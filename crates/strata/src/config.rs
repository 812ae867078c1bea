// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Startup configuration loaded from TOML.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_memory::{DEFAULT_MAX_BYTES, DEFAULT_MAX_ENTRIES, DEFAULT_SWEEP_BATCH, InMemoryTier};
use strata_monitor::MonitorConfig;
use strata_tier::TierKind;
use tick::Clock;

use crate::ConfigError;
use crate::builder::{CacheRouterBuilder, DEFAULT_DEPENDENCY_PRUNE_INTERVAL, DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL};
use crate::strategy::CacheStrategy;

/// Every setting Strata reads at startup.
///
/// All sections and fields are optional in the TOML source. Unknown fields are
/// rejected so typos surface as errors instead of silently using a default.
///
/// # Examples
///
/// ```
/// use strata::StrataConfig;
///
/// let config = StrataConfig::from_toml_str(
///     r#"
///     [cache]
///     default_ttl_secs = 120
///
///     [[cache.strategies]]
///     name = "donor-list"
///     key_pattern = "donor-list"
///     ttl_secs = 300
///     tiers = ["memory", "distributed"]
///
///     [monitor.thresholds]
///     response_time_ms = 500
///     "#,
/// )?;
///
/// assert_eq!(config.cache.strategies.len(), 1);
/// assert_eq!(config.monitor.thresholds.response_time_ms, Some(500));
/// # Ok::<(), strata::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrataConfig {
    /// Cache routing and tier settings.
    pub cache: CacheConfig,
    /// Request tracking, retention and alerting settings.
    pub monitor: MonitorConfig,
}

/// Cache routing and tier settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// TTL used when no strategy matches.
    pub default_ttl_secs: u64,
    /// Tier chain used when no strategy matches.
    pub default_tiers: Vec<TierKind>,
    /// How often expired dependency edges are dropped.
    pub dependency_prune_interval_secs: u64,
    /// Memory tier limits.
    pub memory: MemoryConfig,
    /// Distributed tier settings, used when a distributed tier is supplied.
    pub distributed: DistributedConfig,
    /// Strategies in priority order.
    pub strategies: Vec<StrategyConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: DEFAULT_TTL.as_secs(),
            default_tiers: vec![TierKind::Memory],
            dependency_prune_interval_secs: DEFAULT_DEPENDENCY_PRUNE_INTERVAL.as_secs(),
            memory: MemoryConfig::default(),
            distributed: DistributedConfig::default(),
            strategies: Vec::new(),
        }
    }
}

/// Memory tier limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// Maximum number of entries before LRU eviction.
    pub max_entries: usize,
    /// Maximum total value size in bytes before LRU eviction.
    pub max_bytes: u64,
    /// How often expired entries are swept.
    pub sweep_interval_secs: u64,
    /// Entries examined per sweep step.
    pub sweep_batch: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes: DEFAULT_MAX_BYTES,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
            sweep_batch: DEFAULT_SWEEP_BATCH,
        }
    }
}

/// Distributed tier settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DistributedConfig {
    /// Per-call timeout.
    pub timeout_ms: u64,
    /// Prefix prepended to every key in the external store.
    pub key_prefix: Option<String>,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 500,
            key_prefix: None,
        }
    }
}

impl DistributedConfig {
    /// The per-call timeout as a duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One entry of the strategy table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    /// Unique strategy name, usable in [`CacheOptions::strategy`](crate::CacheOptions::strategy).
    pub name: String,
    /// Substring matched against raw keys.
    pub key_pattern: String,
    /// TTL of entries written under this strategy.
    pub ttl_secs: u64,
    /// Tier chain, fastest first.
    #[serde(default = "default_strategy_tiers")]
    pub tiers: Vec<TierKind>,
    /// Namespace prepended to composed keys.
    #[serde(default)]
    pub namespace: Option<String>,
}

fn default_strategy_tiers() -> Vec<TierKind> {
    vec![TierKind::Memory]
}

impl StrataConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the document is malformed or a value is rejected.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|error| ConfigError::unreadable("malformed TOML", error))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, is malformed or a
    /// value is rejected.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|error| ConfigError::unreadable(format!("cannot read {}", path.display()), error))?;
        Self::from_toml_str(&source)
    }

    /// Checks every value, naming the first rejected field.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the rejected field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        self.monitor.validate()?;
        Ok(())
    }
}

impl CacheConfig {
    /// Checks every cache value, naming the first rejected field.
    ///
    /// Whether strategy tiers are actually configured is checked when the
    /// router is built.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the rejected field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("cache.default_ttl_secs", self.default_ttl_secs),
            ("cache.dependency_prune_interval_secs", self.dependency_prune_interval_secs),
            ("cache.memory.max_bytes", self.memory.max_bytes),
            ("cache.memory.sweep_interval_secs", self.memory.sweep_interval_secs),
            ("cache.distributed.timeout_ms", self.distributed.timeout_ms),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::invalid(format!("{field} must be greater than zero")));
        }
        if self.memory.max_entries == 0 {
            return Err(ConfigError::invalid("cache.memory.max_entries must be greater than zero"));
        }
        if self.memory.sweep_batch == 0 {
            return Err(ConfigError::invalid("cache.memory.sweep_batch must be greater than zero"));
        }
        if self.default_tiers.is_empty() {
            return Err(ConfigError::invalid("cache.default_tiers must not be empty"));
        }

        let mut names = HashSet::new();
        for strategy in &self.strategies {
            let name = &strategy.name;
            if !names.insert(name.as_str()) {
                return Err(ConfigError::invalid(format!("cache.strategies: duplicate name {name:?}")));
            }
            if strategy.key_pattern.is_empty() {
                return Err(ConfigError::invalid(format!("cache.strategies.{name}.key_pattern must not be empty")));
            }
            if strategy.ttl_secs == 0 {
                return Err(ConfigError::invalid(format!("cache.strategies.{name}.ttl_secs must be greater than zero")));
            }
            if strategy.tiers.is_empty() {
                return Err(ConfigError::invalid(format!("cache.strategies.{name}.tiers must not be empty")));
            }
        }
        Ok(())
    }

    /// The strategy table in priority order.
    #[must_use]
    pub fn strategies(&self) -> Vec<CacheStrategy> {
        self.strategies
            .iter()
            .map(|config| {
                let strategy = CacheStrategy::new(&config.name, &config.key_pattern, Duration::from_secs(config.ttl_secs))
                    .tiers(config.tiers.iter().copied());
                match &config.namespace {
                    Some(namespace) => strategy.namespace(namespace),
                    None => strategy,
                }
            })
            .collect()
    }

    /// Builds a memory tier with the configured limits.
    #[must_use]
    pub fn memory_tier(&self, clock: &Clock) -> InMemoryTier {
        InMemoryTier::builder(clock)
            .max_entries(self.memory.max_entries)
            .max_bytes(self.memory.max_bytes)
            .sweep_batch_size(self.memory.sweep_batch)
            .build()
    }

    /// Applies the strategy table, defaults and intervals to `builder`.
    ///
    /// The distributed timeout is applied only when `distributed` is set.
    pub(crate) fn apply(&self, builder: CacheRouterBuilder, distributed: bool) -> CacheRouterBuilder {
        let builder = builder
            .default_strategy(Duration::from_secs(self.default_ttl_secs), self.default_tiers.iter().copied())
            .strategies(self.strategies())
            .sweep_interval(Duration::from_secs(self.memory.sweep_interval_secs))
            .dependency_prune_interval(Duration::from_secs(self.dependency_prune_interval_secs));
        if distributed {
            builder.timeout(TierKind::Distributed, self.distributed.timeout())
        } else {
            builder
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = StrataConfig::from_toml_str("").expect("defaults are valid");
        assert_eq!(config, StrataConfig::default());
        assert_eq!(config.cache.default_ttl_secs, 300);
        assert_eq!(config.cache.default_tiers, vec![TierKind::Memory]);
    }

    #[test]
    fn strategies_keep_their_order_and_fields() {
        let config = StrataConfig::from_toml_str(
            r#"
            [[cache.strategies]]
            name = "donor-list"
            key_pattern = "donor-list"
            ttl_secs = 300
            tiers = ["memory", "distributed"]
            namespace = "donors"

            [[cache.strategies]]
            name = "session"
            key_pattern = "session:"
            ttl_secs = 30
            "#,
        )
        .expect("valid config");

        let strategies = config.cache.strategies();
        assert_eq!(strategies.len(), 2);
        assert_eq!(strategies[0].name(), "donor-list");
        assert_eq!(strategies[0].tier_chain(), [TierKind::Memory, TierKind::Distributed]);
        assert_eq!(strategies[0].namespace_prefix(), Some("donors"));
        assert_eq!(strategies[1].tier_chain(), [TierKind::Memory]);
        assert_eq!(strategies[1].ttl(), Duration::from_secs(30));
    }

    #[test]
    fn rejected_values_name_the_field() {
        let cases = [
            ("[cache]\ndefault_ttl_secs = 0", "cache.default_ttl_secs"),
            ("[cache.memory]\nmax_entries = 0", "cache.memory.max_entries"),
            ("[cache]\ndefault_tiers = []", "cache.default_tiers"),
            ("[monitor]\nretention_secs = 0", "monitor.retention_secs"),
            (
                "[[cache.strategies]]\nname = \"a\"\nkey_pattern = \"a\"\nttl_secs = 0",
                "cache.strategies.a.ttl_secs",
            ),
        ];

        for (source, field) in cases {
            let error = StrataConfig::from_toml_str(source).expect_err(source);
            assert!(error.reason().contains(field), "{source:?} gave {:?}", error.reason());
        }
    }

    #[test]
    fn duplicate_strategy_names_are_rejected() {
        let source = r#"
            [[cache.strategies]]
            name = "a"
            key_pattern = "x"
            ttl_secs = 1

            [[cache.strategies]]
            name = "a"
            key_pattern = "y"
            ttl_secs = 1
        "#;
        let error = StrataConfig::from_toml_str(source).expect_err("duplicate");
        assert!(error.reason().contains("duplicate"));
    }

    #[test]
    fn unknown_fields_and_bad_syntax_are_errors() {
        let error = StrataConfig::from_toml_str("[cache]\ndefault_ttl = 5").expect_err("unknown field");
        assert_eq!(error.reason(), "malformed TOML");

        let error = StrataConfig::from_toml_str("[cache").expect_err("bad syntax");
        assert_eq!(error.reason(), "malformed TOML");
    }

    #[test]
    fn missing_file_is_unreadable() {
        let error = StrataConfig::from_toml_file("/nonexistent/strata.toml").expect_err("missing file");
        assert!(error.reason().starts_with("cannot read"));
    }
}
