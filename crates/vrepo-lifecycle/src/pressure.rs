use std::fmt;

use serde::{Deserialize, Serialize};

/// How close tracked cache memory is to its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPressure {
    Low,
    Medium,
    High,
    Critical,
}

impl MemoryPressure {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryPressure::Low => "low",
            MemoryPressure::Medium => "medium",
            MemoryPressure::High => "high",
            MemoryPressure::Critical => "critical",
        }
    }

    /// Whether the write path should ask for a relief pass.
    pub fn needs_relief(self) -> bool {
        self >= MemoryPressure::High
    }
}

impl fmt::Display for MemoryPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage ratios at which each [`MemoryPressure`] level begins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryPressureThresholds {
    /// `Medium` once `usage / budget >= medium`.
    pub medium: f64,
    /// `High` once `usage / budget >= high`.
    pub high: f64,
    /// `Critical` once `usage / budget >= critical`.
    pub critical: f64,
}

impl Default for MemoryPressureThresholds {
    fn default() -> Self {
        Self {
            medium: 0.70,
            high: 0.85,
            critical: 0.95,
        }
    }
}

impl MemoryPressureThresholds {
    pub fn level_for_ratio(self, ratio: f64) -> MemoryPressure {
        if ratio >= self.critical {
            MemoryPressure::Critical
        } else if ratio >= self.high {
            MemoryPressure::High
        } else if ratio >= self.medium {
            MemoryPressure::Medium
        } else {
            MemoryPressure::Low
        }
    }

    /// Level for `usage` bytes out of `budget`. A zero budget is always
    /// `Critical` once anything is stored.
    pub fn level_for_usage(self, usage: u64, budget: u64) -> MemoryPressure {
        if budget == 0 {
            return if usage == 0 {
                MemoryPressure::Low
            } else {
                MemoryPressure::Critical
            };
        }
        self.level_for_ratio(usage as f64 / budget as f64)
    }

    /// Byte count below which usage is under the `High` level.
    pub fn high_water_mark(self, budget: u64) -> u64 {
        (budget as f64 * self.high) as u64
    }

    /// Thresholds must lie in `(0, 1]` and be strictly increasing.
    pub fn is_valid(self) -> bool {
        0.0 < self.medium
            && self.medium < self.high
            && self.high < self.critical
            && self.critical <= 1.0
    }
}
