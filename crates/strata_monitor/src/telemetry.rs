// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! OpenTelemetry instruments for alerts and request durations.

#[cfg(feature = "metrics")]
use std::sync::Arc;

#[cfg(feature = "metrics")]
use opentelemetry::{
    InstrumentationScope, KeyValue,
    metrics::{Counter, Histogram, Meter, MeterProvider},
};

use crate::alert::Alert;
use crate::record::RequestRecord;

#[cfg(feature = "metrics")]
const METER_NAME: &str = "strata_monitor";
#[cfg(feature = "metrics")]
const VERSION: &str = "v0.1.0";
#[cfg(feature = "metrics")]
const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";
#[cfg(feature = "metrics")]
const ALERT_COUNT_NAME: &str = "strata.alert.count";
#[cfg(feature = "metrics")]
const REQUEST_DURATION_NAME: &str = "strata.request.duration";

#[cfg(feature = "metrics")]
pub(crate) fn create_meter(meter_provider: &dyn MeterProvider) -> Meter {
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
    alerts: Counter<u64>,
    request_duration: Histogram<f64>,
}

#[cfg(feature = "metrics")]
impl Instruments {
    fn new(meter: &Meter) -> Self {
        Self {
            alerts: meter
                .u64_counter(ALERT_COUNT_NAME)
                .with_description("Alerts raised by threshold rules")
                .with_unit("{alert}")
                .build(),
            request_duration: meter
                .f64_histogram(REQUEST_DURATION_NAME)
                .with_description("Duration of tracked requests")
                .with_unit("s")
                .build(),
        }
    }
}

/// Records monitor activity as metrics. A no-op unless built from a meter provider.
#[derive(Debug, Clone, Default)]
pub(crate) struct MonitorTelemetry {
    #[cfg(feature = "metrics")]
    instruments: Option<Arc<Instruments>>,
}

impl MonitorTelemetry {
    #[cfg(feature = "metrics")]
    pub(crate) fn new(meter_provider: &dyn MeterProvider) -> Self {
        let meter = create_meter(meter_provider);
        Self {
            instruments: Some(Arc::new(Instruments::new(&meter))),
        }
    }

    #[cfg_attr(not(feature = "metrics"), expect(unused_variables, reason = "metrics disabled"))]
    pub(crate) fn record_alert(&self, alert: &Alert) {
        #[cfg(feature = "metrics")]
        if let Some(instruments) = &self.instruments {
            instruments.alerts.add(
                1,
                &[
                    KeyValue::new("alert.kind", alert.kind.as_str()),
                    KeyValue::new("alert.severity", alert.severity.as_str()),
                ],
            );
        }
    }

    #[cfg_attr(not(feature = "metrics"), expect(unused_variables, reason = "metrics disabled"))]
    pub(crate) fn record_request(&self, record: &RequestRecord) {
        #[cfg(feature = "metrics")]
        if let Some(instruments) = &self.instruments {
            let status = record.status_code().map_or_else(|| "none".to_owned(), |code| code.to_string());
            instruments
                .request_duration
                .record(record.duration.as_secs_f64(), &[KeyValue::new("http.response.status_code", status)]);
        }
    }
}
