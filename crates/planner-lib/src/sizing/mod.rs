//! VM right-sizing
//!
//! Classifies a VM's CPU and memory allocation against its recent utilization
//! percentiles and suggests a retargeted size. The classification functions
//! here are pure; [`SizingAnalyzer`] wires them to the inventory and metrics
//! sources.

mod analyzer;
mod bulk;

pub use analyzer::SizingAnalyzer;
pub use bulk::{BulkCounts, BulkFailure, BulkRecommendation, BulkSummary, PotentialSavings};

use crate::config::{CostRates, ResourceThresholds};
use crate::models::ResourceAllocation;
use crate::stats::SampleStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Optimal,
    Undersized,
    Oversized,
}

impl Classification {
    /// Ranking used to pick the overall label. Oversized outranks undersized.
    pub fn severity(self) -> u8 {
        match self {
            Self::Oversized => 3,
            Self::Undersized => 2,
            Self::Optimal => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Optimal => "optimal",
            Self::Undersized => "undersized",
            Self::Oversized => "oversized",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Medium,
    High,
}

/// How urgently a recommendation should be acted on.
///
/// Distinct from [`Classification::severity`]: undersizing is an operational
/// risk and ranks highest here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concern {
    Cpu,
    Memory,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilizationLevel {
    Low,
    Optimal,
    High,
}

/// Savings of a CPU downsize. Negative when the P95 retarget grows the VM.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuSavings {
    pub cores_saved: i64,
    pub percent_saved: f64,
    pub estimated_monthly_saving: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemorySavings {
    pub mb_saved: i64,
    pub gb_saved: f64,
    pub percent_saved: f64,
    pub estimated_monthly_saving: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuSizing {
    pub recommendation: Classification,
    pub current_cores: u32,
    pub suggested_cores: u32,
    pub reason: String,
    pub confidence: Confidence,
    pub utilization_level: UtilizationLevel,
    pub potential_savings: Option<CpuSavings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySizing {
    pub recommendation: Classification,
    pub current_mb: u64,
    pub suggested_mb: u64,
    pub reason: String,
    pub confidence: Confidence,
    pub utilization_level: UtilizationLevel,
    pub potential_savings: Option<MemorySavings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallRecommendation {
    pub recommendation: Classification,
    pub primary_concern: Option<Concern>,
    pub secondary_concern: Option<Concern>,
    pub action_priority: ActionPriority,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtilizationStats {
    pub cpu: SampleStats,
    pub memory: SampleStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Full right-sizing analysis of one VM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingReport {
    pub vdi_id: String,
    pub vdi_name: String,
    pub current_specs: ResourceAllocation,
    pub cpu: CpuSizing,
    pub memory: MemorySizing,
    pub overall: OverallRecommendation,
    pub utilization_stats: UtilizationStats,
    pub data_points: usize,
    pub time_range: TimeRange,
    pub analyzed_at: DateTime<Utc>,
}

/// Result of analyzing one VM. A VM without samples in the window is not an
/// error and never carries a classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "analysis", rename_all = "snake_case")]
pub enum SizingOutcome {
    Analyzed(SizingReport),
    InsufficientData {
        vdi_id: String,
        vdi_name: String,
        current_specs: ResourceAllocation,
        message: String,
        data_points: usize,
        time_range: TimeRange,
    },
}

impl SizingOutcome {
    pub fn vdi_id(&self) -> &str {
        match self {
            Self::Analyzed(report) => &report.vdi_id,
            Self::InsufficientData { vdi_id, .. } => vdi_id,
        }
    }

    pub fn report(&self) -> Option<&SizingReport> {
        match self {
            Self::Analyzed(report) => Some(report),
            Self::InsufficientData { .. } => None,
        }
    }
}

/// Strict comparisons: an average exactly at the oversized threshold or a
/// P95 exactly at the undersized threshold is optimal.
pub fn classify(stats: &SampleStats, thresholds: &ResourceThresholds) -> Classification {
    if stats.avg < thresholds.oversized_avg {
        Classification::Oversized
    } else if stats.p95 > thresholds.undersized_p95 {
        Classification::Undersized
    } else {
        Classification::Optimal
    }
}

fn confidence(
    classification: Classification,
    stats: &SampleStats,
    thresholds: &ResourceThresholds,
) -> Confidence {
    let extreme = match classification {
        Classification::Oversized => stats.avg < thresholds.extreme_low_avg,
        Classification::Undersized => stats.p95 > thresholds.extreme_high_p95,
        Classification::Optimal => true,
    };
    if extreme {
        Confidence::High
    } else {
        Confidence::Medium
    }
}

pub fn utilization_level(avg: f64, thresholds: &ResourceThresholds) -> UtilizationLevel {
    if avg < thresholds.oversized_avg {
        UtilizationLevel::Low
    } else if avg > thresholds.undersized_p95 {
        UtilizationLevel::High
    } else {
        UtilizationLevel::Optimal
    }
}

/// Scale `current` so the observed P95 load lands on `target_percent`
fn retarget(current: f64, p95: f64, target_percent: f64) -> f64 {
    (current * p95 / target_percent).ceil()
}

fn percent_of(saved: i64, current: u64) -> f64 {
    if current == 0 {
        0.0
    } else {
        saved as f64 / current as f64 * 100.0
    }
}

pub fn analyze_cpu(
    current_cores: u32,
    stats: &SampleStats,
    thresholds: &ResourceThresholds,
    rates: &CostRates,
) -> CpuSizing {
    let recommendation = classify(stats, thresholds);
    let (suggested_cores, reason) = match recommendation {
        Classification::Oversized => (
            retarget(current_cores as f64, stats.p95, thresholds.shrink_target).max(1.0) as u32,
            format!(
                "Average CPU usage is {:.1}%, indicating over-allocation. P95 usage: {:.1}%",
                stats.avg, stats.p95
            ),
        ),
        Classification::Undersized => (
            retarget(current_cores as f64, stats.p95, thresholds.grow_target) as u32,
            format!(
                "P95 CPU usage is {:.1}%, indicating potential performance issues",
                stats.p95
            ),
        ),
        Classification::Optimal => (current_cores, "CPU allocation is optimal".to_string()),
    };

    let potential_savings = (recommendation == Classification::Oversized).then(|| {
        let cores_saved = current_cores as i64 - suggested_cores as i64;
        CpuSavings {
            cores_saved,
            percent_saved: percent_of(cores_saved, current_cores as u64),
            estimated_monthly_saving: cores_saved as f64 * rates.per_core_month,
        }
    });

    CpuSizing {
        recommendation,
        current_cores,
        suggested_cores,
        reason,
        confidence: confidence(recommendation, stats, thresholds),
        utilization_level: utilization_level(stats.avg, thresholds),
        potential_savings,
    }
}

/// Memory suggestions are rounded up to a multiple of `step_mb`, and a
/// downsize never goes below one step.
pub fn analyze_memory(
    current_mb: u64,
    stats: &SampleStats,
    thresholds: &ResourceThresholds,
    step_mb: u64,
    rates: &CostRates,
) -> MemorySizing {
    let round_up = |mb: f64| -> u64 {
        let mb = mb.max(0.0) as u64;
        mb.div_ceil(step_mb) * step_mb
    };

    let recommendation = classify(stats, thresholds);
    let (suggested_mb, reason) = match recommendation {
        Classification::Oversized => (
            round_up(retarget(current_mb as f64, stats.p95, thresholds.shrink_target).max(step_mb as f64)),
            format!(
                "Average memory usage is {:.1}%, indicating over-allocation. P95 usage: {:.1}%",
                stats.avg, stats.p95
            ),
        ),
        Classification::Undersized => (
            round_up(retarget(current_mb as f64, stats.p95, thresholds.grow_target)),
            format!(
                "P95 memory usage is {:.1}%, indicating potential memory pressure",
                stats.p95
            ),
        ),
        Classification::Optimal => (current_mb, "Memory allocation is optimal".to_string()),
    };

    let potential_savings = (recommendation == Classification::Oversized).then(|| {
        let mb_saved = current_mb as i64 - suggested_mb as i64;
        let gb_saved = mb_saved as f64 / 1024.0;
        MemorySavings {
            mb_saved,
            gb_saved,
            percent_saved: percent_of(mb_saved, current_mb),
            estimated_monthly_saving: gb_saved * rates.per_gb_month,
        }
    });

    MemorySizing {
        recommendation,
        current_mb,
        suggested_mb,
        reason,
        confidence: confidence(recommendation, stats, thresholds),
        utilization_level: utilization_level(stats.avg, thresholds),
        potential_savings,
    }
}

pub fn action_priority(
    recommendation: Classification,
    primary_concern: Option<Concern>,
) -> ActionPriority {
    match (recommendation, primary_concern) {
        (Classification::Undersized, _) => ActionPriority::High,
        (Classification::Oversized, Some(Concern::Both)) => ActionPriority::Medium,
        (Classification::Oversized, _) => ActionPriority::Low,
        (Classification::Optimal, _) => ActionPriority::None,
    }
}

/// Resolve CPU and memory verdicts into one label
pub fn overall_recommendation(cpu: &CpuSizing, memory: &MemorySizing) -> OverallRecommendation {
    let cpu_rec = cpu.recommendation;
    let mem_rec = memory.recommendation;

    let (recommendation, primary_concern, secondary_concern) =
        match cpu_rec.severity().cmp(&mem_rec.severity()) {
            std::cmp::Ordering::Greater => (
                cpu_rec,
                Some(Concern::Cpu),
                (mem_rec != Classification::Optimal).then_some(Concern::Memory),
            ),
            std::cmp::Ordering::Less => (
                mem_rec,
                Some(Concern::Memory),
                (cpu_rec != Classification::Optimal).then_some(Concern::Cpu),
            ),
            std::cmp::Ordering::Equal if cpu_rec != Classification::Optimal => {
                (cpu_rec, Some(Concern::Both), None)
            }
            std::cmp::Ordering::Equal => (Classification::Optimal, None, None),
        };

    OverallRecommendation {
        recommendation,
        primary_concern,
        secondary_concern,
        action_priority: action_priority(recommendation, primary_concern),
        summary: summary(cpu_rec, mem_rec, recommendation).to_string(),
    }
}

fn summary(cpu: Classification, memory: Classification, overall: Classification) -> &'static str {
    use Classification::*;
    match (overall, cpu, memory) {
        (Optimal, _, _) => "VM is optimally sized for current workload",
        (Oversized, Oversized, Oversized) => {
            "VM is over-allocated for both CPU and memory. Consider downsizing to reduce costs."
        }
        (Oversized, Oversized, _) => "VM has excessive CPU allocation. Consider reducing CPU cores.",
        (Oversized, _, _) => "VM has excessive memory allocation. Consider reducing memory.",
        (Undersized, Undersized, Undersized) => {
            "VM is under-allocated for both CPU and memory. Upgrade recommended for better performance."
        }
        (Undersized, Undersized, _) => {
            "VM needs more CPU cores to handle current workload effectively."
        }
        (Undersized, _, _) => "VM needs more memory to handle current workload effectively.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizingThresholds;

    fn stats(avg: f64, p95: f64) -> SampleStats {
        SampleStats {
            avg,
            min: 0.0,
            max: p95,
            p95,
            p99: p95,
            count: 100,
        }
    }

    fn cpu(cores: u32, avg: f64, p95: f64) -> CpuSizing {
        analyze_cpu(
            cores,
            &stats(avg, p95),
            &SizingThresholds::default().cpu,
            &CostRates::default(),
        )
    }

    fn memory(mb: u64, avg: f64, p95: f64) -> MemorySizing {
        let thresholds = SizingThresholds::default();
        analyze_memory(
            mb,
            &stats(avg, p95),
            &thresholds.memory,
            thresholds.memory_step_mb,
            &CostRates::default(),
        )
    }

    #[test]
    fn test_cpu_boundaries_are_strict() {
        assert_eq!(cpu(4, 20.0, 50.0).recommendation, Classification::Optimal);
        assert_eq!(cpu(4, 50.0, 85.0).recommendation, Classification::Optimal);
        assert_eq!(cpu(4, 19.9, 50.0).recommendation, Classification::Oversized);
        assert_eq!(cpu(4, 50.0, 85.1).recommendation, Classification::Undersized);
    }

    #[test]
    fn test_memory_boundaries_are_strict() {
        assert_eq!(memory(8_192, 30.0, 60.0).recommendation, Classification::Optimal);
        assert_eq!(memory(8_192, 50.0, 90.0).recommendation, Classification::Optimal);
        assert_eq!(memory(8_192, 29.9, 60.0).recommendation, Classification::Oversized);
        assert_eq!(memory(8_192, 50.0, 90.1).recommendation, Classification::Undersized);
    }

    #[test]
    fn test_cpu_downsize_suggestion() {
        let sizing = cpu(8, 15.0, 40.0);
        assert_eq!(sizing.recommendation, Classification::Oversized);
        assert_eq!(sizing.suggested_cores, 5);
        assert_eq!(sizing.confidence, Confidence::Medium);
        assert_eq!(sizing.utilization_level, UtilizationLevel::Low);

        let savings = sizing.potential_savings.unwrap();
        assert_eq!(savings.cores_saved, 3);
        assert!((savings.percent_saved - 37.5).abs() < 1e-9);
        assert!((savings.estimated_monthly_saving - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_downsize_keeps_one_core() {
        let sizing = cpu(2, 1.0, 0.0);
        assert_eq!(sizing.suggested_cores, 1);
        assert_eq!(sizing.confidence, Confidence::High);
    }

    #[test]
    fn test_cpu_upsize_suggestion() {
        let sizing = cpu(4, 70.0, 96.0);
        assert_eq!(sizing.recommendation, Classification::Undersized);
        // ceil(4 * 96 / 75) = ceil(5.12)
        assert_eq!(sizing.suggested_cores, 6);
        assert_eq!(sizing.confidence, Confidence::High);
        assert!(sizing.potential_savings.is_none());
    }

    #[test]
    fn test_memory_rounds_to_step() {
        let sizing = memory(4_096, 25.0, 40.0);
        assert_eq!(sizing.recommendation, Classification::Oversized);
        // ceil(4096 * 40 / 70) = 2341 -> 2560
        assert_eq!(sizing.suggested_mb, 2_560);
        assert_eq!(sizing.confidence, Confidence::Medium);
        let savings = sizing.potential_savings.unwrap();
        assert_eq!(savings.mb_saved, 1_536);
        assert!((savings.gb_saved - 1.5).abs() < 1e-9);
        assert!((savings.estimated_monthly_saving - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_memory_downsize_floor_is_one_step() {
        let sizing = memory(2_048, 5.0, 1.0);
        assert_eq!(sizing.suggested_mb, 512);
        assert_eq!(sizing.confidence, Confidence::High);
    }

    #[test]
    fn test_memory_upsize() {
        let sizing = memory(8_192, 85.0, 92.0);
        assert_eq!(sizing.recommendation, Classification::Undersized);
        // ceil(8192 * 92 / 80) = 9421 -> 9728
        assert_eq!(sizing.suggested_mb, 9_728);
        assert_eq!(sizing.confidence, Confidence::Medium);
    }

    #[test]
    fn test_overall_prefers_oversized() {
        let overall = overall_recommendation(&cpu(4, 10.5, 30.0), &memory(8_192, 60.0, 95.0));
        assert_eq!(overall.recommendation, Classification::Oversized);
        assert_eq!(overall.primary_concern, Some(Concern::Cpu));
        assert_eq!(overall.secondary_concern, Some(Concern::Memory));
        assert_eq!(overall.action_priority, ActionPriority::Low);
    }

    #[test]
    fn test_overall_both_agree() {
        let overall = overall_recommendation(&cpu(4, 5.0, 10.0), &memory(8_192, 10.0, 20.0));
        assert_eq!(overall.primary_concern, Some(Concern::Both));
        assert_eq!(overall.secondary_concern, None);
        assert_eq!(overall.action_priority, ActionPriority::Medium);
        assert!(overall.summary.contains("both CPU and memory"));

        let overall = overall_recommendation(&cpu(4, 90.0, 99.0), &memory(8_192, 95.0, 99.0));
        assert_eq!(overall.recommendation, Classification::Undersized);
        assert_eq!(overall.action_priority, ActionPriority::High);
    }

    #[test]
    fn test_overall_undersized_single_dimension() {
        let overall = overall_recommendation(&cpu(4, 50.0, 60.0), &memory(8_192, 70.0, 93.0));
        assert_eq!(overall.recommendation, Classification::Undersized);
        assert_eq!(overall.primary_concern, Some(Concern::Memory));
        assert_eq!(overall.action_priority, ActionPriority::High);
        assert_eq!(
            overall.summary,
            "VM needs more memory to handle current workload effectively."
        );
    }

    #[test]
    fn test_overall_optimal() {
        let overall = overall_recommendation(&cpu(4, 50.0, 60.0), &memory(8_192, 50.0, 60.0));
        assert_eq!(overall.recommendation, Classification::Optimal);
        assert_eq!(overall.primary_concern, None);
        assert_eq!(overall.action_priority, ActionPriority::None);
    }
}
