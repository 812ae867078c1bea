// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The caching and monitoring halves wired together.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::pin::pin;
use std::sync::Arc;

use futures::future::{Either, select};
#[cfg(feature = "metrics")]
use opentelemetry::metrics::MeterProvider;
use serde::Serialize;
use serde::de::DeserializeOwned;
use strata_distributed::{DistributedTier, KeyValueStore};
use strata_memory::InMemoryTier;
use strata_monitor::{
    Alert, AnalyticsSink, BackgroundTasks, ErrorRecord, PerformanceMonitor, PerformanceMonitorBuilder, RequestMetadata,
    RequestRecord, ResourceProbe, ResponseInfo, SubscriptionId,
};
use strata_tier::{CacheTier, DynamicTier, Error, TierKind};
use tick::Clock;

use crate::builder::CacheRouterBuilder;
use crate::config::{DistributedConfig, StrataConfig};
use crate::events::CacheEvent;
use crate::health::{HealthSnapshot, HealthStatus};
use crate::options::CacheOptions;
use crate::router::{CacheRouter, InvalidationReport, WriteReport};
use crate::{Aborted, ConfigError};

/// A cache router and a performance monitor sharing one clock.
///
/// Every hit, miss, write, removal and tier failure seen by the router is
/// recorded as a custom metric on the monitor (`cache_hit`, `cache_miss`,
/// `cache_set`, `cache_delete`, `cache_error`) tagged with `tier` and
/// `operation`, valued at the call duration in milliseconds.
///
/// Cloning is cheap and clones share all state.
///
/// # Examples
///
/// ```
/// use strata::{CacheOptions, Strata};
/// use strata_monitor::{RequestMetadata, ResponseInfo};
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let strata = Strata::builder(&Clock::new_frozen()).build()?;
///
/// let id = strata.track_request_start(None, RequestMetadata::new().path("/donors"));
/// strata.cache_set("donor-list:all", &["ada", "grace"], &CacheOptions::new()).await?;
/// let donors: Option<Vec<String>> = strata.cache_get("donor-list:all", &CacheOptions::new()).await;
/// strata.track_request_end(&id, ResponseInfo::status(200));
///
/// assert_eq!(donors.map(|d| d.len()), Some(2));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # })?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct Strata {
    inner: Arc<StrataInner>,
}

#[derive(Debug)]
struct StrataInner {
    router: CacheRouter,
    monitor: PerformanceMonitor,
    subscription: SubscriptionId,
}

impl Drop for StrataInner {
    fn drop(&mut self) {
        self.router.unsubscribe(self.subscription);
    }
}

impl Strata {
    /// Starts building an instance driven by `clock`.
    #[must_use]
    pub fn builder(clock: &Clock) -> StrataBuilder {
        StrataBuilder::new(clock)
    }

    fn new(router: CacheRouter, monitor: PerformanceMonitor) -> Self {
        let sink = monitor.clone();
        let subscription = router.subscribe(move |event: &CacheEvent| {
            let Some(name) = event.metric_name() else {
                return;
            };
            let tags = BTreeMap::from([
                ("tier".to_owned(), event.tier.as_str().to_owned()),
                ("operation".to_owned(), event.operation.as_str().to_owned()),
            ]);
            sink.record_custom(name, event.duration.as_secs_f64() * 1_000.0, tags);
        });

        Self {
            inner: Arc::new(StrataInner {
                router,
                monitor,
                subscription,
            }),
        }
    }

    /// The cache router.
    #[must_use]
    pub fn router(&self) -> &CacheRouter {
        &self.inner.router
    }

    /// The performance monitor.
    #[must_use]
    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.inner.monitor
    }

    /// Reads and decodes `raw_key`.
    ///
    /// A value that no longer decodes as `T` is logged and reported as a miss.
    pub async fn cache_get<T: DeserializeOwned>(&self, raw_key: &str, options: &CacheOptions) -> Option<T> {
        let bytes = self.inner.router.get(raw_key, options).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(cache.key = raw_key, error = %error, "cache.decode_failed");
                None
            }
        }
    }

    /// Like [`cache_get`](Self::cache_get), but gives up as soon as `abort` completes.
    ///
    /// In-flight tier calls are dropped on abort. Writes already applied, such
    /// as a finished backfill, are kept.
    ///
    /// # Errors
    ///
    /// Returns [`Aborted`] if `abort` completes first.
    pub async fn cache_get_cancellable<T: DeserializeOwned>(
        &self,
        raw_key: &str,
        options: &CacheOptions,
        abort: impl Future<Output = ()>,
    ) -> Result<Option<T>, Aborted> {
        let read = pin!(self.cache_get(raw_key, options));
        match select(read, pin!(abort)).await {
            Either::Left((value, _)) => Ok(value),
            Either::Right(((), _)) => {
                tracing::debug!(cache.key = raw_key, "cache.read_aborted");
                Err(Aborted::read(raw_key))
            }
        }
    }

    /// Encodes `value` and writes it to every tier of the resolved chain.
    ///
    /// # Errors
    ///
    /// Returns an error of kind [`Serialization`](strata_tier::ErrorKind::Serialization)
    /// if `value` cannot be encoded. Tier failures are reported in the
    /// [`WriteReport`], not as errors.
    pub async fn cache_set<T: Serialize + ?Sized>(&self, raw_key: &str, value: &T, options: &CacheOptions) -> Result<WriteReport, Error> {
        let bytes = serde_json::to_vec(value).map_err(Error::serialization)?;
        Ok(self.inner.router.set(raw_key, bytes, options).await)
    }

    /// Removes `raw_key` from every tier.
    pub async fn cache_delete(&self, raw_key: &str, options: &CacheOptions) -> WriteReport {
        self.inner.router.delete(raw_key, options).await
    }

    /// Removes every key matching `pattern`; see [`CacheRouter::invalidate`].
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` is rejected.
    pub async fn cache_invalidate(&self, pattern: &str) -> Result<InvalidationReport, Error> {
        self.inner.router.invalidate(pattern).await
    }

    /// Removes every key registered under `entity`.
    pub async fn cache_invalidate_dependency(&self, entity: &str) -> InvalidationReport {
        self.inner.router.invalidate_by_dependency(entity).await
    }

    /// Opens a request and returns its id.
    pub fn track_request_start(&self, id: Option<String>, metadata: RequestMetadata) -> String {
        self.inner.monitor.start_request(id, metadata)
    }

    /// Marks a phase of an open request. Unknown ids are ignored.
    pub fn track_request_mark(&self, id: &str, phase: &str, metadata: Option<BTreeMap<String, String>>) {
        self.inner.monitor.mark_request(id, phase, metadata);
    }

    /// Closes a request. Returns `None` if `id` was not open.
    pub fn track_request_end(&self, id: &str, response: ResponseInfo) -> Option<RequestRecord> {
        self.inner.monitor.end_request(id, response)
    }

    /// Stores an application error.
    pub fn record_error(&self, error: ErrorRecord) {
        self.inner.monitor.record_error(error);
    }

    /// Stores a named value.
    pub fn record_custom(&self, name: impl Into<String>, value: f64, tags: BTreeMap<String, String>) {
        self.inner.monitor.record_custom(name, value, tags);
    }

    /// Registers an alert callback.
    pub fn subscribe_alerts(&self, listener: impl Fn(&Alert) + Send + Sync + 'static) -> SubscriptionId {
        self.inner.monitor.subscribe_alerts(listener)
    }

    /// Probes every tier and summarizes the error-rate window.
    pub async fn health_snapshot(&self) -> HealthSnapshot {
        let monitor = &self.inner.monitor;
        let window = monitor.config().error_rate_window();
        let tier_availability = self.inner.router.tier_availability().await;
        let summary = monitor.summarize(window);
        let status = HealthStatus::assess(&tier_availability, &summary, monitor.config().thresholds.error_rate);

        if status != HealthStatus::Healthy {
            tracing::warn!(health.status = status.as_str(), "health.not_healthy");
        }

        HealthSnapshot {
            status,
            tier_availability,
            recent_alert_count: monitor.alert_count(window),
            summary,
        }
    }

    /// Spawns every periodic task of both halves on the ambient Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use = "dropping the handle stops the tasks"]
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = self.inner.monitor.start_background();
        tasks.extend(self.inner.router.start_background());
        tasks
    }
}

type StoreFactory = Box<dyn FnOnce(&Clock, &DistributedConfig) -> DynamicTier + Send>;

/// Builds a [`Strata`].
///
/// Without an explicit memory tier, one is built from the cache configuration.
/// The distributed tier is optional.
pub struct StrataBuilder {
    clock: Clock,
    config: StrataConfig,
    router: CacheRouterBuilder,
    monitor: PerformanceMonitorBuilder,
    has_memory: bool,
    has_distributed: bool,
    store: Option<StoreFactory>,
}

impl Debug for StrataBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrataBuilder")
            .field("config", &self.config)
            .field("router", &self.router)
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl StrataBuilder {
    fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            config: StrataConfig::default(),
            router: CacheRouter::builder(clock),
            monitor: PerformanceMonitor::builder(clock),
            has_memory: false,
            has_distributed: false,
            store: None,
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn config(mut self, config: StrataConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `tier` instead of a memory tier built from the configuration.
    #[must_use]
    pub fn memory(mut self, tier: InMemoryTier) -> Self {
        self.router = self.router.memory(tier);
        self.has_memory = true;
        self
    }

    /// Uses `tier` as the distributed tier as is.
    #[must_use]
    pub fn distributed(mut self, tier: impl CacheTier + 'static) -> Self {
        self.router = self.router.distributed(tier);
        self.has_distributed = true;
        self.store = None;
        self
    }

    /// Uses a [`DistributedTier`] over `store`, keyed with the configured prefix.
    #[must_use]
    pub fn distributed_store(mut self, store: impl KeyValueStore + 'static) -> Self {
        self.store = Some(Box::new(move |clock, config| {
            let tier = DistributedTier::new(store, clock);
            match &config.key_prefix {
                Some(prefix) => DynamicTier::new(tier.with_key_prefix(prefix)),
                None => DynamicTier::new(tier),
            }
        }));
        self.has_distributed = true;
        self
    }

    /// Uses any tier implementation for `kind`.
    ///
    /// A memory tier added this way is not swept in the background.
    #[must_use]
    pub fn tier(mut self, kind: TierKind, tier: impl CacheTier + 'static) -> Self {
        self.router = self.router.tier(kind, tier);
        match kind {
            TierKind::Memory => self.has_memory = true,
            TierKind::Distributed => {
                self.has_distributed = true;
                self.store = None;
            }
        }
        self
    }

    /// Uses `probe` for system samples.
    #[must_use]
    pub fn probe(mut self, probe: impl ResourceProbe + 'static) -> Self {
        self.monitor = self.monitor.probe(probe);
        self
    }

    /// Forwards finalized requests and custom metrics to `sink`.
    #[must_use]
    pub fn analytics(mut self, sink: impl AnalyticsSink + 'static) -> Self {
        self.monitor = self.monitor.analytics(sink);
        self
    }

    /// Records cache and monitor instruments through `provider`.
    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn meter_provider(mut self, provider: &dyn MeterProvider) -> Self {
        self.router = self.router.meter_provider(provider);
        self.monitor = self.monitor.meter_provider(provider);
        self
    }

    /// Validates the configuration and builds both halves.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid or a strategy
    /// refers to a tier that is not configured.
    pub fn build(self) -> Result<Strata, ConfigError> {
        let config = self.config;
        config.validate()?;

        let mut router = self.router;
        if !self.has_memory {
            router = router.memory(config.cache.memory_tier(&self.clock));
        }
        if let Some(factory) = self.store {
            router = router.distributed(factory(&self.clock, &config.cache.distributed));
        }
        let router = config.cache.apply(router, self.has_distributed).build()?;
        let monitor = self.monitor.config(config.monitor).build()?;

        tracing::debug!(
            strata.tiers = router.tier_kinds().len(),
            strata.strategies = router.strategies().len(),
            "strata.built"
        );
        Ok(Strata::new(router, monitor))
    }
}
