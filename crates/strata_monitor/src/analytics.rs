// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Out-of-band delivery of finalized metrics.

use std::fmt::Debug;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::record::{CustomMetric, RequestRecord};

/// Payload pushed to an [`AnalyticsSink`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum AnalyticsEvent {
    /// A request was finalized.
    Request(RequestRecord),
    /// A custom metric was recorded.
    Custom(CustomMetric),
}

/// Receives finalized records. Delivery is fire-and-forget.
///
/// `send` is called on the request path and must not block.
pub trait AnalyticsSink: Send + Sync + Debug {
    /// Hands an event to the sink.
    fn send(&self, event: AnalyticsEvent);
}

/// Forwards events into a bounded channel, dropping them when it is full.
///
/// # Examples
///
/// ```
/// use strata_monitor::{AnalyticsEvent, AnalyticsSink, ChannelSink, CustomMetric};
///
/// let (sink, mut receiver) = ChannelSink::new(16);
/// sink.send(AnalyticsEvent::Custom(CustomMetric {
///     name: "cache.hit".to_owned(),
///     value: 1.0,
///     tags: Default::default(),
/// }));
/// assert!(receiver.try_recv().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<AnalyticsEvent>,
}

impl ChannelSink {
    /// Creates a sink and the receiver an ingestion task should drain.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AnalyticsEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Wraps an existing sender.
    #[must_use]
    pub fn from_sender(sender: mpsc::Sender<AnalyticsEvent>) -> Self {
        Self { sender }
    }
}

impl AnalyticsSink for ChannelSink {
    fn send(&self, event: AnalyticsEvent) {
        if let Err(error) = self.sender.try_send(event) {
            tracing::debug!(error = %error, "analytics.dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn custom(name: &str) -> AnalyticsEvent {
        AnalyticsEvent::Custom(CustomMetric {
            name: name.to_owned(),
            value: 1.0,
            tags: BTreeMap::new(),
        })
    }

    #[test]
    fn full_channel_drops_without_blocking() {
        let (sink, mut receiver) = ChannelSink::new(1);
        sink.send(custom("first"));
        sink.send(custom("second"));

        assert_eq!(receiver.try_recv().ok(), Some(custom("first")));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (sink, receiver) = ChannelSink::new(4);
        drop(receiver);
        sink.send(custom("lost"));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(custom("cache.hit")).expect("serializes");
        assert_eq!(json["type"], "custom");
        assert_eq!(json["name"], "cache.hit");
    }
}
