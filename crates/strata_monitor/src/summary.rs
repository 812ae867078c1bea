// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Aggregates over a window of stored metrics.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::Serialize;

use crate::record::{CustomMetric, ErrorRecord, RequestRecord, SystemSample};

/// Running statistics for one custom metric name.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CustomAggregate {
    /// Number of observations.
    pub count: u64,
    /// Sum of observed values.
    pub sum: f64,
    /// Smallest observed value.
    pub min: f64,
    /// Largest observed value.
    pub max: f64,
}

impl CustomAggregate {
    fn new(value: f64) -> Self {
        Self {
            count: 1,
            sum: value,
            min: value,
            max: value,
        }
    }

    fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Mean of observed values.
    #[must_use]
    pub fn mean(&self) -> f64 {
        #[expect(clippy::cast_precision_loss, reason = "counts stay far below 2^52")]
        let count = self.count as f64;
        self.sum / count
    }
}

/// Aggregates returned by [`MetricsStore::summarize`](crate::MetricsStore::summarize).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    /// Width of the summarized window.
    pub window: Duration,
    /// Completed requests in the window.
    pub request_count: u64,
    /// Error records in the window.
    pub error_count: u64,
    /// `error_count / request_count`, or zero without traffic.
    pub error_rate: f64,
    /// Mean request duration.
    pub mean_duration: Option<Duration>,
    /// Median request duration.
    pub p50_duration: Option<Duration>,
    /// 95th percentile request duration.
    pub p95_duration: Option<Duration>,
    /// 99th percentile request duration.
    pub p99_duration: Option<Duration>,
    /// Requests per status code.
    pub status_codes: BTreeMap<u16, u64>,
    /// Most frequent paths, most frequent first.
    pub top_paths: Vec<(String, u64)>,
    /// Error records per error type.
    pub error_types: BTreeMap<String, u64>,
    /// Number of system samples, including failed ones.
    pub system_sample_count: u64,
    /// Mean CPU usage over successful samples.
    pub mean_cpu_percent: Option<f64>,
    /// Mean host memory usage over successful samples.
    pub mean_memory_percent: Option<f64>,
    /// Custom metrics by name.
    pub custom: BTreeMap<String, CustomAggregate>,
}

impl MetricsSummary {
    /// Returns the number of custom observations recorded under `name`.
    #[must_use]
    pub fn custom_count(&self, name: &str) -> u64 {
        self.custom.get(name).map_or(0, |aggregate| aggregate.count)
    }
}

/// Accumulates records into a [`MetricsSummary`].
#[derive(Debug, Default)]
pub(crate) struct SummaryBuilder {
    durations: Vec<Duration>,
    status_codes: BTreeMap<u16, u64>,
    paths: HashMap<String, u64>,
    error_count: u64,
    error_types: BTreeMap<String, u64>,
    sample_count: u64,
    cpu: Vec<f64>,
    memory: Vec<f64>,
    custom: BTreeMap<String, CustomAggregate>,
}

const UNKNOWN_PATH: &str = "unknown";

impl SummaryBuilder {
    pub(crate) fn add_request(&mut self, record: &RequestRecord) {
        self.durations.push(record.duration);
        if let Some(code) = record.status_code() {
            *self.status_codes.entry(code).or_default() += 1;
        }
        let path = record.metadata.path.as_deref().unwrap_or(UNKNOWN_PATH);
        *self.paths.entry(path.to_owned()).or_default() += 1;
    }

    pub(crate) fn add_error(&mut self, record: &ErrorRecord) {
        self.error_count += 1;
        *self.error_types.entry(record.error_type.clone()).or_default() += 1;
    }

    pub(crate) fn add_sample(&mut self, sample: &SystemSample) {
        self.sample_count += 1;
        if !sample.is_error() {
            self.cpu.push(sample.cpu_percent);
            self.memory.push(sample.memory_percent());
        }
    }

    pub(crate) fn add_custom(&mut self, metric: &CustomMetric) {
        self.custom
            .entry(metric.name.clone())
            .and_modify(|aggregate| aggregate.add(metric.value))
            .or_insert_with(|| CustomAggregate::new(metric.value));
    }

    pub(crate) fn finish(mut self, window: Duration, top_paths: usize) -> MetricsSummary {
        self.durations.sort_unstable();
        let request_count = self.durations.len() as u64;

        #[expect(clippy::cast_precision_loss, reason = "counts stay far below 2^52")]
        let error_rate = if request_count == 0 {
            0.0
        } else {
            self.error_count as f64 / request_count as f64
        };

        let mut paths: Vec<(String, u64)> = self.paths.into_iter().collect();
        paths.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        paths.truncate(top_paths);

        MetricsSummary {
            window,
            request_count,
            error_count: self.error_count,
            error_rate,
            mean_duration: mean_duration(&self.durations),
            p50_duration: percentile(&self.durations, 50),
            p95_duration: percentile(&self.durations, 95),
            p99_duration: percentile(&self.durations, 99),
            status_codes: self.status_codes,
            top_paths: paths,
            error_types: self.error_types,
            system_sample_count: self.sample_count,
            mean_cpu_percent: mean(&self.cpu),
            mean_memory_percent: mean(&self.memory),
            custom: self.custom,
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    #[expect(clippy::cast_precision_loss, reason = "sample counts stay far below 2^52")]
    let len = values.len() as f64;
    Some(values.iter().sum::<f64>() / len)
}

fn mean_duration(sorted: &[Duration]) -> Option<Duration> {
    if sorted.is_empty() {
        return None;
    }

    let total: u128 = sorted.iter().map(Duration::as_nanos).sum();
    let nanos = total / sorted.len() as u128;
    Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
}

/// Nearest-rank percentile over sorted values.
fn percentile(sorted: &[Duration], pct: usize) -> Option<Duration> {
    if sorted.is_empty() {
        return None;
    }

    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted.get(rank - 1).copied()
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::record::{RequestMetadata, ResponseInfo};

    fn request(path: Option<&str>, millis: u64, status: u16) -> RequestRecord {
        RequestRecord {
            id: "r".to_owned(),
            started_at: SystemTime::UNIX_EPOCH,
            ended_at: SystemTime::UNIX_EPOCH,
            duration: Duration::from_millis(millis),
            metadata: RequestMetadata {
                path: path.map(str::to_owned),
                ..RequestMetadata::default()
            },
            marks: Vec::new(),
            response: ResponseInfo::status(status),
        }
    }

    #[test]
    fn percentiles_use_nearest_rank() {
        let durations: Vec<Duration> = (1..=100).map(Duration::from_millis).collect();
        assert_eq!(percentile(&durations, 50), Some(Duration::from_millis(50)));
        assert_eq!(percentile(&durations, 95), Some(Duration::from_millis(95)));
        assert_eq!(percentile(&durations, 99), Some(Duration::from_millis(99)));
        assert_eq!(percentile(&durations[..1], 99), Some(Duration::from_millis(1)));
        assert_eq!(percentile(&[], 50), None);
    }

    #[test]
    fn empty_window_has_zero_error_rate() {
        let mut builder = SummaryBuilder::default();
        builder.add_error(&ErrorRecord::new("io", "boom"));
        let summary = builder.finish(Duration::from_secs(60), 10);

        assert_eq!(summary.request_count, 0);
        assert_eq!(summary.error_count, 1);
        assert!(summary.error_rate.abs() < f64::EPSILON);
        assert_eq!(summary.mean_duration, None);
    }

    #[test]
    fn top_paths_are_ranked_and_truncated() {
        let mut builder = SummaryBuilder::default();
        for (path, times) in [("/a", 3), ("/b", 5), ("/c", 3), ("/d", 1)] {
            for _ in 0..times {
                builder.add_request(&request(Some(path), 10, 200));
            }
        }
        builder.add_request(&request(None, 10, 500));

        let summary = builder.finish(Duration::from_secs(60), 3);
        assert_eq!(
            summary.top_paths,
            vec![("/b".to_owned(), 5), ("/a".to_owned(), 3), ("/c".to_owned(), 3)]
        );
        assert_eq!(summary.status_codes.get(&200), Some(&12));
        assert_eq!(summary.status_codes.get(&500), Some(&1));
    }

    #[test]
    fn failed_samples_do_not_skew_means() {
        let mut builder = SummaryBuilder::default();
        builder.add_sample(&SystemSample {
            cpu_percent: 40.0,
            ..SystemSample::default()
        });
        builder.add_sample(&SystemSample::failed("unavailable"));

        let summary = builder.finish(Duration::from_secs(60), 10);
        assert_eq!(summary.system_sample_count, 2);
        assert_eq!(summary.mean_cpu_percent, Some(40.0));
    }

    #[test]
    fn custom_metrics_aggregate_by_name() {
        let mut builder = SummaryBuilder::default();
        for value in [1.0, 3.0, 2.0] {
            builder.add_custom(&CustomMetric {
                name: "cache.hit".to_owned(),
                value,
                tags: BTreeMap::new(),
            });
        }

        let summary = builder.finish(Duration::from_secs(60), 10);
        let aggregate = summary.custom["cache.hit"];
        assert_eq!(aggregate.count, 3);
        assert!((aggregate.mean() - 2.0).abs() < f64::EPSILON);
        assert!((aggregate.min - 1.0).abs() < f64::EPSILON);
        assert!((aggregate.max - 3.0).abs() < f64::EPSILON);
        assert_eq!(summary.custom_count("cache.hit"), 3);
        assert_eq!(summary.custom_count("cache.miss"), 0);
    }
}
