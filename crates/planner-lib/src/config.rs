//! Engine configuration
//!
//! Every field has a default so partial configuration documents deserialize.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default lookback for sizing analysis (24 hours)
pub const DEFAULT_LOOKBACK_HOURS: u32 = 24;

/// Maximum number of recommendations returned by bulk analysis
pub const DEFAULT_BULK_TOP_N: usize = 50;

/// Profiles only form for groups with at least this many VMs
pub const MIN_GROUP_SIZE: usize = 2;

/// Classification thresholds and retarget points for one resource
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceThresholds {
    /// Average usage below this is oversized
    pub oversized_avg: f64,
    /// P95 usage above this is undersized
    pub undersized_p95: f64,
    /// P95 load is retargeted to this percentage when shrinking
    pub shrink_target: f64,
    /// P95 load is retargeted to this percentage when growing
    pub grow_target: f64,
    /// Average below this makes an oversized verdict high confidence
    pub extreme_low_avg: f64,
    /// P95 above this makes an undersized verdict high confidence
    pub extreme_high_p95: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingThresholds {
    pub cpu: ResourceThresholds,
    pub memory: ResourceThresholds,
    /// Memory suggestions are rounded up to a multiple of this
    pub memory_step_mb: u64,
}

impl Default for SizingThresholds {
    fn default() -> Self {
        Self {
            cpu: ResourceThresholds {
                oversized_avg: 20.0,
                undersized_p95: 85.0,
                shrink_target: 70.0,
                grow_target: 75.0,
                extreme_low_avg: 10.0,
                extreme_high_p95: 95.0,
            },
            memory: ResourceThresholds {
                oversized_avg: 30.0,
                undersized_p95: 90.0,
                shrink_target: 70.0,
                grow_target: 80.0,
                extreme_low_avg: 20.0,
                extreme_high_p95: 95.0,
            },
            memory_step_mb: 512,
        }
    }
}

/// Placeholder monthly rates for savings estimates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostRates {
    pub per_core_month: f64,
    pub per_gb_month: f64,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            per_core_month: 15.0,
            per_gb_month: 0.50,
        }
    }
}

/// Thresholds for cluster-level capacity recommendations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorThresholds {
    pub scale_out_percent: f64,
    pub consolidate_cpu_percent: f64,
    pub low_efficiency: f64,
}

impl Default for AdvisorThresholds {
    fn default() -> Self {
        Self {
            scale_out_percent: 80.0,
            consolidate_cpu_percent: 30.0,
            low_efficiency: 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout for each individual inventory or metrics fetch
    pub fetch_timeout_ms: u64,
    pub default_lookback_hours: u32,
    pub max_lookback_hours: u32,
    /// Trailing window for profile utilization stats
    pub profile_stats_days: u32,
    /// Worker pool size for bulk sizing
    pub bulk_concurrency: usize,
    pub bulk_top_n: usize,
    pub min_group_size: usize,
    /// Used for auto profiles whose sample VM reserves no MHz
    pub default_mhz_per_core: u64,
    pub sizing: SizingThresholds,
    pub cost_rates: CostRates,
    pub advisor: AdvisorThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 5_000,
            default_lookback_hours: DEFAULT_LOOKBACK_HOURS,
            max_lookback_hours: 24 * 90,
            profile_stats_days: 30,
            bulk_concurrency: 8,
            bulk_top_n: DEFAULT_BULK_TOP_N,
            min_group_size: MIN_GROUP_SIZE,
            default_mhz_per_core: 2_000,
            sizing: SizingThresholds::default(),
            cost_rates: CostRates::default(),
            advisor: AdvisorThresholds::default(),
        }
    }
}

impl EngineConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn profile_stats_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.profile_stats_days as i64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch_timeout_ms == 0 {
            return Err(EngineError::validation("fetch_timeout_ms must be positive"));
        }
        if self.bulk_concurrency == 0 {
            return Err(EngineError::validation("bulk_concurrency must be positive"));
        }
        if self.default_lookback_hours == 0
            || self.default_lookback_hours > self.max_lookback_hours
        {
            return Err(EngineError::validation(format!(
                "default_lookback_hours must be within 1..={}",
                self.max_lookback_hours
            )));
        }
        if self.min_group_size == 0 {
            return Err(EngineError::validation("min_group_size must be positive"));
        }
        if self.sizing.memory_step_mb == 0 {
            return Err(EngineError::validation("memory_step_mb must be positive"));
        }
        for (name, t) in [("cpu", &self.sizing.cpu), ("memory", &self.sizing.memory)] {
            if t.oversized_avg >= t.undersized_p95 {
                return Err(EngineError::validation(format!(
                    "{name} oversized threshold must be below the undersized threshold"
                )));
            }
            if !(t.shrink_target > 0.0 && t.shrink_target <= 100.0)
                || !(t.grow_target > 0.0 && t.grow_target <= 100.0)
            {
                return Err(EngineError::validation(format!(
                    "{name} retarget percentages must be within (0, 100]"
                )));
            }
        }
        if self.cost_rates.per_core_month < 0.0 || self.cost_rates.per_gb_month < 0.0 {
            return Err(EngineError::validation("cost rates must not be negative"));
        }
        Ok(())
    }

    /// Validate a requested lookback window
    pub fn lookback_hours(&self, hours: Option<u32>) -> Result<u32> {
        let hours = hours.unwrap_or(self.default_lookback_hours);
        if hours == 0 || hours > self.max_lookback_hours {
            return Err(EngineError::validation(format!(
                "lookback must be within 1..={} hours, got {}",
                self.max_lookback_hours, hours
            )));
        }
        Ok(hours)
    }
}
