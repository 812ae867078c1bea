// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use tick::Clock;

use crate::record::{CustomMetric, ErrorRecord, RequestRecord, SystemSample};
use crate::summary::{MetricsSummary, SummaryBuilder};

const BUCKET_MILLIS: u64 = 60_000;

/// A payload together with the time it was stored.
#[derive(Debug, Clone)]
struct Stamped<T> {
    at: SystemTime,
    value: T,
}

#[derive(Debug, Default)]
struct Bucket {
    requests: Vec<Stamped<RequestRecord>>,
    errors: Vec<Stamped<ErrorRecord>>,
    samples: Vec<Stamped<SystemSample>>,
    custom: Vec<Stamped<CustomMetric>>,
}

impl Bucket {
    fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.errors.is_empty() && self.samples.is_empty() && self.custom.is_empty()
    }

    fn retain_after(&mut self, cutoff: SystemTime) {
        self.requests.retain(|r| r.at > cutoff);
        self.errors.retain(|r| r.at > cutoff);
        self.samples.retain(|r| r.at > cutoff);
        self.custom.retain(|r| r.at > cutoff);
    }
}

fn unix_millis(time: SystemTime) -> u64 {
    let since_epoch = time.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
    u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX)
}

fn bucket_start(time: SystemTime) -> u64 {
    let millis = unix_millis(time);
    millis - millis % BUCKET_MILLIS
}

fn bucket_end(start: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_millis(start.saturating_add(BUCKET_MILLIS))
}

/// Append-only, minute-bucketed metric storage.
///
/// Every append lands in the bucket for the minute in which it is stored,
/// regardless of when the underlying event happened. Buckets are individually
/// locked, so appends to different minutes never contend, and the bucket map
/// itself is only write-locked when a new minute starts or during pruning.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use strata_monitor::{ErrorRecord, MetricsStore};
/// use tick::Clock;
///
/// # fn example(clock: &Clock) {
/// let store = MetricsStore::new(clock, Duration::from_secs(24 * 60 * 60));
/// store.record_error(ErrorRecord::new("timeout", "upstream took too long"));
///
/// let summary = store.summarize(Duration::from_secs(300));
/// assert_eq!(summary.error_count, 1);
/// # }
/// ```
#[derive(Debug)]
pub struct MetricsStore {
    clock: Clock,
    retention: Duration,
    top_paths: usize,
    buckets: RwLock<BTreeMap<u64, Arc<Mutex<Bucket>>>>,
}

impl MetricsStore {
    /// Creates a store that keeps data for `retention`.
    #[must_use]
    pub fn new(clock: &Clock, retention: Duration) -> Self {
        Self {
            clock: clock.clone(),
            retention,
            top_paths: 10,
            buckets: RwLock::new(BTreeMap::new()),
        }
    }

    /// Sets how many paths summaries report.
    #[must_use]
    pub fn with_top_paths(mut self, top_paths: usize) -> Self {
        self.top_paths = top_paths;
        self
    }

    /// Returns the retention window.
    #[must_use]
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Stores a completed request.
    pub fn record_request(&self, record: RequestRecord) {
        self.append(|bucket, at| bucket.requests.push(Stamped { at, value: record }));
    }

    /// Stores an error.
    pub fn record_error(&self, record: ErrorRecord) {
        self.append(|bucket, at| bucket.errors.push(Stamped { at, value: record }));
    }

    /// Stores a resource sample.
    pub fn record_system_sample(&self, sample: SystemSample) {
        self.append(|bucket, at| bucket.samples.push(Stamped { at, value: sample }));
    }

    /// Stores a named value with tags.
    pub fn record_custom(&self, name: impl Into<String>, value: f64, tags: BTreeMap<String, String>) {
        let metric = CustomMetric {
            name: name.into(),
            value,
            tags,
        };
        self.append(|bucket, at| bucket.custom.push(Stamped { at, value: metric }));
    }

    fn append(&self, push: impl FnOnce(&mut Bucket, SystemTime)) {
        let now = self.clock.system_time();
        let bucket = self.bucket_for(bucket_start(now));
        push(&mut bucket.lock(), now);
    }

    fn bucket_for(&self, start: u64) -> Arc<Mutex<Bucket>> {
        if let Some(bucket) = self.buckets.read().get(&start) {
            return Arc::clone(bucket);
        }

        Arc::clone(self.buckets.write().entry(start).or_default())
    }

    /// Buckets overlapping `[from, ∞)`.
    fn buckets_since(&self, from: Option<SystemTime>) -> Vec<Arc<Mutex<Bucket>>> {
        let lower = from.map_or(0, bucket_start);
        self.buckets.read().range(lower..).map(|(_, bucket)| Arc::clone(bucket)).collect()
    }

    /// Aggregates everything stored during the last `window`.
    #[must_use]
    pub fn summarize(&self, window: Duration) -> MetricsSummary {
        let from = self.clock.system_time().checked_sub(window);
        let included = |at: SystemTime| from.is_none_or(|from| at >= from);

        let mut builder = SummaryBuilder::default();
        for bucket in self.buckets_since(from) {
            let bucket = bucket.lock();
            bucket.requests.iter().filter(|r| included(r.at)).for_each(|r| builder.add_request(&r.value));
            bucket.errors.iter().filter(|r| included(r.at)).for_each(|r| builder.add_error(&r.value));
            bucket.samples.iter().filter(|r| included(r.at)).for_each(|r| builder.add_sample(&r.value));
            bucket.custom.iter().filter(|r| included(r.at)).for_each(|r| builder.add_custom(&r.value));
        }

        builder.finish(window, self.top_paths)
    }

    /// Counts requests and errors in buckets overlapping the last `window`.
    ///
    /// Cheaper than [`summarize`](Self::summarize), at minute granularity.
    #[must_use]
    pub fn request_and_error_counts(&self, window: Duration) -> (u64, u64) {
        let from = self.clock.system_time().checked_sub(window);
        self.buckets_since(from).iter().fold((0, 0), |(requests, errors), bucket| {
            let bucket = bucket.lock();
            (requests + bucket.requests.len() as u64, errors + bucket.errors.len() as u64)
        })
    }

    /// Deletes everything stored more than the retention window ago.
    ///
    /// Returns the number of buckets dropped.
    pub fn prune(&self) -> usize {
        let Some(cutoff) = self.clock.system_time().checked_sub(self.retention) else {
            return 0;
        };

        let mut dropped = 0;
        let mut partial = Vec::new();
        {
            let mut buckets = self.buckets.write();
            buckets.retain(|start, bucket| {
                if bucket_end(*start) <= cutoff {
                    dropped += 1;
                    false
                } else {
                    if unix_millis(cutoff) >= *start {
                        partial.push(Arc::clone(bucket));
                    }
                    true
                }
            });
        }

        for bucket in partial {
            bucket.lock().retain_after(cutoff);
        }

        if dropped > 0 {
            tracing::debug!(metrics.buckets_dropped = dropped, "metrics.prune");
        }

        dropped
    }

    /// Number of live buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.read().values().all(|bucket| bucket.lock().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use tick::ClockControl;

    use super::*;

    #[test]
    fn appends_are_bucketed_by_storage_minute() {
        let control = ClockControl::new();
        let store = MetricsStore::new(&control.to_clock(), Duration::from_secs(3_600));

        store.record_custom("a", 1.0, BTreeMap::new());
        control.advance(Duration::from_secs(30));
        store.record_custom("a", 1.0, BTreeMap::new());
        assert_eq!(store.bucket_count(), 1);

        control.advance(Duration::from_secs(30));
        store.record_custom("a", 1.0, BTreeMap::new());
        assert_eq!(store.bucket_count(), 2);
    }

    #[test]
    fn summarize_respects_window() {
        let control = ClockControl::new();
        let store = MetricsStore::new(&control.to_clock(), Duration::from_secs(3_600));

        control.advance(Duration::from_secs(600));
        store.record_error(ErrorRecord::new("old", "x"));
        control.advance(Duration::from_secs(290));
        store.record_error(ErrorRecord::new("new", "x"));
        control.advance(Duration::from_secs(20));

        let summary = store.summarize(Duration::from_secs(300));
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.error_types.get("new"), Some(&1));

        assert_eq!(store.summarize(Duration::from_secs(311)).error_count, 2);
    }

    #[test]
    fn prune_trims_partially_expired_bucket() {
        let control = ClockControl::new();
        let store = MetricsStore::new(&control.to_clock(), Duration::from_secs(3_600));

        control.advance(Duration::from_secs(120));
        store.record_error(ErrorRecord::new("first", "x"));
        control.advance(Duration::from_secs(30));
        store.record_error(ErrorRecord::new("second", "x"));

        control.advance(Duration::from_secs(3_600 - 30));
        assert_eq!(store.prune(), 0);
        let summary = store.summarize(Duration::from_secs(10_000));
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.error_types.get("second"), Some(&1));

        control.advance(Duration::from_secs(30));
        assert_eq!(store.prune(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn prune_before_retention_elapses_is_noop() {
        let control = ClockControl::new();
        let store = MetricsStore::new(&control.to_clock(), Duration::from_secs(3_600));
        store.record_error(ErrorRecord::new("e", "x"));

        assert_eq!(store.prune(), 0);
        assert_eq!(store.summarize(Duration::from_secs(60)).error_count, 1);
    }
}
