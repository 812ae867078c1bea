// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Request tracking, time-bucketed metrics and threshold alerting.
//!
//! The pieces compose bottom-up:
//!
//! - [`MetricsStore`] appends request, error, resource and custom metrics into
//!   minute buckets and answers windowed [`summarize`](MetricsStore::summarize)
//!   queries. Retention is enforced by [`prune`](MetricsStore::prune).
//! - [`RequestTracker`] keeps the open-request table and produces immutable
//!   [`RequestRecord`]s.
//! - [`ThresholdEvaluator`] turns new records and samples into [`Alert`]s,
//!   keeps a bounded alert log and notifies subscribers.
//! - [`SystemSampler`] measures process CPU and host memory through a
//!   [`ResourceProbe`].
//! - [`PerformanceMonitor`] wires all of the above together and can run the
//!   periodic sampler, pruner and orphan sweep as [`BackgroundTasks`].
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use strata_monitor::{AlertKind, MonitorConfig, PerformanceMonitor, RequestMetadata, ResponseInfo};
//! use tick::ClockControl;
//!
//! let control = ClockControl::new();
//! let monitor = PerformanceMonitor::builder(&control.to_clock())
//!     .config(MonitorConfig::default())
//!     .build()?;
//!
//! let id = monitor.start_request(None, RequestMetadata::new().method("GET").path("/donors"));
//! control.advance(Duration::from_millis(1_500));
//! monitor.end_request(&id, ResponseInfo::status(200));
//!
//! let alerts = monitor.recent_alerts(10);
//! assert_eq!(alerts.len(), 1);
//! assert_eq!(alerts[0].kind, AlertKind::SlowResponse);
//! # Ok::<(), strata_monitor::ConfigError>(())
//! ```

mod alert;
mod analytics;
mod background;
mod config;
mod error;
mod evaluator;
mod monitor;
mod observer;
mod record;
mod sampler;
mod store;
mod summary;
mod telemetry;
#[cfg(any(feature = "test-util", test))]
pub mod testing;
mod tracker;

pub use alert::{Alert, AlertKind, Severity};
pub use analytics::{AnalyticsEvent, AnalyticsSink, ChannelSink};
pub use background::BackgroundTasks;
pub use config::{MonitorConfig, Thresholds};
pub use error::{ConfigError, EvaluationError, ProbeError};
pub use evaluator::ThresholdEvaluator;
pub use monitor::{ORPHANED_REQUESTS, PerformanceMonitor, PerformanceMonitorBuilder, SERVER_ERROR};
pub use observer::{SubscriptionId, Subscribers};
pub use record::{CustomMetric, DiskUsage, ErrorRecord, MemoryUsage, PhaseMark, RequestMetadata, RequestRecord, ResponseInfo, SystemSample};
pub use sampler::{SysinfoProbe, ResourceProbe, SystemSampler};
pub use store::MetricsStore;
pub use summary::{CustomAggregate, MetricsSummary};
pub use tracker::RequestTracker;
pub use uuid::Uuid;
