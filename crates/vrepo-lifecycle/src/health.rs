//! Derived health status for the caching layer.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pressure::MemoryPressure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        })
    }
}

/// Limits that move the status from healthy to degraded to unhealthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthThresholds {
    pub degraded_latency: Duration,
    pub unhealthy_latency: Duration,
    pub degraded_errors: usize,
    pub unhealthy_errors: usize,
    /// How far back an error still counts as recent.
    pub error_window: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            degraded_latency: Duration::from_millis(500),
            unhealthy_latency: Duration::from_millis(2000),
            degraded_errors: 5,
            unhealthy_errors: 20,
            error_window: Duration::from_secs(5 * 60),
        }
    }
}

impl HealthThresholds {
    /// Classify one observation. Every limit that was crossed contributes a
    /// reason; the worst one decides the status.
    pub fn classify(
        &self,
        latency: Duration,
        recent_errors: usize,
        pressure: MemoryPressure,
    ) -> (HealthStatus, Vec<String>) {
        let mut status = HealthStatus::Healthy;
        let mut reasons = Vec::new();
        let mut raise = |to: HealthStatus, reason: String| {
            status = status.max(to);
            reasons.push(reason);
        };

        if latency >= self.unhealthy_latency {
            raise(HealthStatus::Unhealthy, format!("store latency {latency:?}"));
        } else if latency >= self.degraded_latency {
            raise(HealthStatus::Degraded, format!("store latency {latency:?}"));
        }

        if recent_errors >= self.unhealthy_errors {
            raise(HealthStatus::Unhealthy, format!("{recent_errors} recent errors"));
        } else if recent_errors >= self.degraded_errors {
            raise(HealthStatus::Degraded, format!("{recent_errors} recent errors"));
        }

        match pressure {
            MemoryPressure::Critical => {
                raise(HealthStatus::Unhealthy, "memory pressure critical".into())
            }
            MemoryPressure::High => raise(HealthStatus::Degraded, "memory pressure high".into()),
            _ => {}
        }

        (status, reasons)
    }
}

/// Result of one health check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Round trip of a store ping; `None` when the ping failed.
    pub latency: Option<Duration>,
    pub recent_errors: usize,
    pub memory_pressure: MemoryPressure,
    pub memory_usage: u64,
    pub reasons: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_system_is_healthy() {
        let (status, reasons) =
            HealthThresholds::default().classify(Duration::from_millis(3), 0, MemoryPressure::Low);
        assert_eq!(status, HealthStatus::Healthy);
        assert!(reasons.is_empty());
    }

    #[test]
    fn slow_store_degrades_then_fails() {
        let t = HealthThresholds::default();
        let (s, _) = t.classify(Duration::from_millis(600), 0, MemoryPressure::Low);
        assert_eq!(s, HealthStatus::Degraded);
        let (s, _) = t.classify(Duration::from_secs(3), 0, MemoryPressure::Low);
        assert_eq!(s, HealthStatus::Unhealthy);
    }

    #[test]
    fn errors_and_pressure_contribute() {
        let t = HealthThresholds::default();
        let (s, reasons) = t.classify(Duration::ZERO, 5, MemoryPressure::High);
        assert_eq!(s, HealthStatus::Degraded);
        assert_eq!(reasons.len(), 2);
        let (s, _) = t.classify(Duration::ZERO, 20, MemoryPressure::Low);
        assert_eq!(s, HealthStatus::Unhealthy);
        let (s, _) = t.classify(Duration::ZERO, 0, MemoryPressure::Critical);
        assert_eq!(s, HealthStatus::Unhealthy);
    }

    #[test]
    fn worst_signal_wins() {
        let t = HealthThresholds::default();
        let (s, reasons) = t.classify(Duration::from_secs(5), 6, MemoryPressure::Medium);
        assert_eq!(s, HealthStatus::Unhealthy);
        assert_eq!(reasons.len(), 2);
    }
}
