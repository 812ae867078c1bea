// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Helpers for asserting on emitted metrics and logs in tests.

use std::io::Write;
use std::sync::Arc;

use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::data::{AggregatedMetrics, Metric, MetricData, ResourceMetrics, ScopeMetrics};
use opentelemetry_sdk::metrics::{InMemoryMetricExporter, SdkMeterProvider};
use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

/// Collects metrics in memory and asserts on their attributes.
#[derive(Debug)]
pub struct MetricTester {
    exporter: InMemoryMetricExporter,
    provider: SdkMeterProvider,
}

impl Default for MetricTester {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricTester {
    /// Creates a tester with an empty exporter.
    #[must_use]
    pub fn new() -> Self {
        let in_memory = InMemoryMetricExporter::default();

        Self {
            exporter: in_memory.clone(),
            provider: SdkMeterProvider::builder().with_periodic_exporter(in_memory).build(),
        }
    }

    /// The provider to hand to the code under test.
    #[must_use]
    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.provider
    }

    /// Flushes and returns every data point attribute seen so far.
    ///
    /// # Panics
    ///
    /// Panics if the provider cannot be flushed.
    #[must_use]
    pub fn collect_attributes(&self) -> Vec<KeyValue> {
        self.provider.force_flush().expect("flush metrics");
        self.exporter
            .get_finished_metrics()
            .expect("read exported metrics")
            .iter()
            .flat_map(ResourceMetrics::scope_metrics)
            .flat_map(ScopeMetrics::metrics)
            .flat_map(attributes_of)
            .collect()
    }

    /// Asserts that every pair in `key_values` was recorded at least once.
    ///
    /// # Panics
    ///
    /// Panics if an attribute is missing.
    pub fn assert_attributes_contain(&self, key_values: &[KeyValue]) {
        let attributes = self.collect_attributes();

        for attr in key_values {
            assert!(
                attributes.contains(attr),
                "attribute {attr:?} not found in collected attributes: {attributes:?}"
            );
        }
    }
}

fn attributes_of(metric: &Metric) -> Vec<KeyValue> {
    macro_rules! points {
        ($data:expr) => {
            match $data {
                MetricData::Gauge(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
                MetricData::Sum(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
                MetricData::Histogram(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
                MetricData::ExponentialHistogram(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
            }
        };
    }

    match metric.data() {
        AggregatedMetrics::F64(data) => points!(data),
        AggregatedMetrics::U64(data) => points!(data),
        AggregatedMetrics::I64(data) => points!(data),
    }
}

/// Captures formatted log output for assertions.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Creates an empty capture buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything captured so far.
    #[must_use]
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).to_string()
    }

    /// Asserts that the captured output contains `expected`.
    ///
    /// # Panics
    ///
    /// Panics if `expected` was not logged.
    pub fn assert_contains(&self, expected: &str) {
        let output = self.output();
        assert!(
            output.contains(expected),
            "log output does not contain '{expected}', got:\n{output}"
        );
    }

    /// A subscriber writing into this buffer; install with `tracing::subscriber::set_default`.
    #[must_use]
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        use tracing_subscriber::layer::SubscriberExt;
        tracing_subscriber::registry().with(tracing_subscriber::fmt::layer().with_writer(self.clone()).with_ansi(false))
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

/// Writer handed out by [`LogCapture`].
#[derive(Debug)]
pub struct LogCaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
