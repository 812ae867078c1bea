// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Logs and OpenTelemetry instruments for tier calls.

#[cfg(feature = "metrics")]
use std::sync::Arc;

#[cfg(feature = "metrics")]
use opentelemetry::{
    InstrumentationScope, KeyValue,
    metrics::{Counter, Gauge, Histogram, Meter, MeterProvider},
};
use strata_tier::TierKind;

use crate::events::{CacheActivity, CacheEvent};

#[cfg(feature = "metrics")]
const METER_NAME: &str = "strata";
#[cfg(feature = "metrics")]
const VERSION: &str = "v0.1.0";
#[cfg(feature = "metrics")]
const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";

#[cfg(feature = "metrics")]
const CACHE_EVENT_COUNT_NAME: &str = "strata.cache.event.count";
#[cfg(feature = "metrics")]
const CACHE_OPERATION_DURATION_NAME: &str = "strata.cache.operation.duration";
#[cfg(feature = "metrics")]
const CACHE_SIZE_NAME: &str = "strata.cache.size";

#[cfg(feature = "metrics")]
const CACHE_TIER: &str = "cache.tier";
#[cfg(feature = "metrics")]
const CACHE_OPERATION: &str = "cache.operation";
#[cfg(feature = "metrics")]
const CACHE_ACTIVITY: &str = "cache.activity";

#[cfg(feature = "metrics")]
fn create_meter(meter_provider: &dyn MeterProvider) -> Meter {
    meter_provider.meter_with_scope(
        InstrumentationScope::builder(METER_NAME)
            .with_version(VERSION)
            .with_schema_url(SCHEMA_URL)
            .build(),
    )
}

#[cfg(feature = "metrics")]
#[derive(Debug)]
struct Instruments {
    events: Counter<u64>,
    duration: Histogram<f64>,
    size: Gauge<u64>,
}

#[cfg(feature = "metrics")]
impl Instruments {
    fn new(meter: &Meter) -> Self {
        Self {
            events: meter
                .u64_counter(CACHE_EVENT_COUNT_NAME)
                .with_description("Cache tier events")
                .with_unit("{event}")
                .build(),
            duration: meter
                .f64_histogram(CACHE_OPERATION_DURATION_NAME)
                .with_description("Duration of cache tier calls")
                .with_unit("s")
                .build(),
            size: meter
                .u64_gauge(CACHE_SIZE_NAME)
                .with_description("Number of entries held by a tier")
                .with_unit("{entry}")
                .build(),
        }
    }
}

/// Records tier calls as `tracing` events and, when configured, as metrics.
#[derive(Debug, Clone, Default)]
pub(crate) struct CacheTelemetry {
    #[cfg(feature = "metrics")]
    instruments: Option<Arc<Instruments>>,
}

impl CacheTelemetry {
    #[cfg(feature = "metrics")]
    pub(crate) fn new(meter_provider: &dyn MeterProvider) -> Self {
        let meter = create_meter(meter_provider);
        Self {
            instruments: Some(Arc::new(Instruments::new(&meter))),
        }
    }

    pub(crate) fn record(&self, event: &CacheEvent) {
        #[cfg(feature = "metrics")]
        if let Some(instruments) = &self.instruments {
            let attributes = [
                KeyValue::new(CACHE_TIER, event.tier.as_str()),
                KeyValue::new(CACHE_OPERATION, event.operation.as_str()),
                KeyValue::new(CACHE_ACTIVITY, event.activity.as_str()),
            ];
            instruments.events.add(1, &attributes);
            instruments.duration.record(event.duration.as_secs_f64(), &attributes);
        }

        Self::emit(event);
    }

    #[cfg_attr(not(feature = "metrics"), expect(unused_variables, reason = "metrics disabled"))]
    pub(crate) fn record_size(&self, tier: TierKind, size: u64) {
        #[cfg(feature = "metrics")]
        if let Some(instruments) = &self.instruments {
            instruments.size.record(size, &[KeyValue::new(CACHE_TIER, tier.as_str())]);
        }
    }

    fn emit(event: &CacheEvent) {
        let tier = event.tier.as_str();
        let operation = event.operation.as_str();
        let activity = event.activity.as_str();
        let duration_ns = event.duration.as_nanos();

        // Tracing levels must be constant at each call site.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    cache.tier = tier,
                    cache.operation = operation,
                    cache.activity = activity,
                    cache.duration_ns = duration_ns,
                    "cache.event"
                )
            };
        }

        match event.activity {
            CacheActivity::Error => emit_event!(error),
            CacheActivity::Timeout => emit_event!(warn),
            CacheActivity::Hit | CacheActivity::Miss => emit_event!(debug),
            _ => emit_event!(info),
        }
    }
}
