// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Health snapshots combining tier availability and monitor state.

use serde::Serialize;
use strata_monitor::MetricsSummary;
use strata_tier::TierKind;

/// Overall service health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Every tier answers and the error rate is within its threshold.
    Healthy,
    /// A tier other than memory is unreachable, or the error rate is too high.
    Degraded,
    /// The memory tier is missing or failing.
    Unhealthy,
}

impl HealthStatus {
    /// Returns the lowercase status name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }

    /// Derives the status from probe results and the rolling error rate.
    ///
    /// An empty window never degrades health, whatever the threshold.
    pub(crate) fn assess(tiers: &[(TierKind, bool)], summary: &MetricsSummary, error_rate_threshold: Option<f64>) -> Self {
        let memory_ok = tiers.iter().any(|(kind, ok)| *kind == TierKind::Memory && *ok);
        if !memory_ok {
            return Self::Unhealthy;
        }

        let tier_down = tiers.iter().any(|(_, ok)| !ok);
        let error_rate_high = summary.request_count > 0 && error_rate_threshold.is_some_and(|threshold| summary.error_rate > threshold);
        if tier_down || error_rate_high { Self::Degraded } else { Self::Healthy }
    }
}

/// Answer of the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct HealthSnapshot {
    /// Overall status.
    pub status: HealthStatus,
    /// `(tier, reachable)` fastest first.
    pub tier_availability: Vec<(TierKind, bool)>,
    /// Alerts raised during the error-rate window.
    pub recent_alert_count: usize,
    /// Metrics over the error-rate window.
    pub summary: MetricsSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(request_count: u64, error_rate: f64) -> MetricsSummary {
        MetricsSummary {
            request_count,
            error_rate,
            ..MetricsSummary::default()
        }
    }

    #[test]
    fn memory_failure_is_unhealthy() {
        let tiers = [(TierKind::Memory, false), (TierKind::Distributed, true)];
        assert_eq!(HealthStatus::assess(&tiers, &summary(0, 0.0), Some(0.05)), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::assess(&[(TierKind::Distributed, true)], &summary(0, 0.0), None), HealthStatus::Unhealthy);
    }

    #[test]
    fn distributed_failure_degrades() {
        let tiers = [(TierKind::Memory, true), (TierKind::Distributed, false)];
        assert_eq!(HealthStatus::assess(&tiers, &summary(0, 0.0), Some(0.05)), HealthStatus::Degraded);
    }

    #[test]
    fn error_rate_degrades_only_with_traffic() {
        let tiers = [(TierKind::Memory, true)];
        assert_eq!(HealthStatus::assess(&tiers, &summary(10, 0.5), Some(0.05)), HealthStatus::Degraded);
        assert_eq!(HealthStatus::assess(&tiers, &summary(10, 0.05), Some(0.05)), HealthStatus::Healthy);
        assert_eq!(HealthStatus::assess(&tiers, &summary(0, 1.0), Some(0.05)), HealthStatus::Healthy);
        assert_eq!(HealthStatus::assess(&tiers, &summary(10, 0.5), None), HealthStatus::Healthy);
    }

    #[test]
    fn status_serializes_in_snake_case() {
        assert_eq!(serde_json::to_string(&HealthStatus::Degraded).expect("serialize"), "\"degraded\"");
        assert_eq!(HealthStatus::Unhealthy.as_str(), "unhealthy");
    }
}
