//! Cluster-level capacity recommendations

use super::cluster_utilization;
use crate::config::AdvisorThresholds;
use crate::models::{AllocationProfile, Cluster};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    Capacity,
    Optimization,
    Efficiency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPriority {
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationAction {
    ScaleOut,
    Optimize,
    Rightsize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityRecommendation {
    pub kind: RecommendationKind,
    pub category: RecommendationCategory,
    pub message: String,
    pub priority: RecommendationPriority,
    pub action: RecommendationAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
}

/// Advisory findings for a cluster from its persisted capacity and profiles
pub fn capacity_recommendations(
    cluster: &Cluster,
    profiles: &[AllocationProfile],
    thresholds: &AdvisorThresholds,
) -> Vec<CapacityRecommendation> {
    let utilization = cluster_utilization(&cluster.capacity);
    let mut recommendations = Vec::new();

    if utilization.cpu.percentage > thresholds.scale_out_percent {
        recommendations.push(CapacityRecommendation {
            kind: RecommendationKind::Warning,
            category: RecommendationCategory::Capacity,
            message: format!(
                "Cluster CPU utilization is {:.1}%. Consider adding more hosts or migrating VMs.",
                utilization.cpu.percentage
            ),
            priority: RecommendationPriority::High,
            action: RecommendationAction::ScaleOut,
            profile_id: None,
        });
    }

    if utilization.memory.percentage > thresholds.scale_out_percent {
        recommendations.push(CapacityRecommendation {
            kind: RecommendationKind::Warning,
            category: RecommendationCategory::Capacity,
            message: format!(
                "Cluster memory utilization is {:.1}%. Consider adding more hosts or memory.",
                utilization.memory.percentage
            ),
            priority: RecommendationPriority::High,
            action: RecommendationAction::ScaleOut,
            profile_id: None,
        });
    }

    if utilization.cpu.percentage < thresholds.consolidate_cpu_percent {
        recommendations.push(CapacityRecommendation {
            kind: RecommendationKind::Info,
            category: RecommendationCategory::Optimization,
            message: format!(
                "Cluster CPU utilization is only {:.1}%. Consider consolidating VMs or downsizing.",
                utilization.cpu.percentage
            ),
            priority: RecommendationPriority::Medium,
            action: RecommendationAction::Optimize,
            profile_id: None,
        });
    }

    for profile in profiles.iter().filter(|p| p.is_active) {
        let efficiency = profile.utilization_stats.efficiency;
        if efficiency < thresholds.low_efficiency {
            recommendations.push(CapacityRecommendation {
                kind: RecommendationKind::Warning,
                category: RecommendationCategory::Efficiency,
                message: format!(
                    "Profile \"{}\" has low efficiency ({:.1}%). Consider right-sizing or consolidation.",
                    profile.name, efficiency
                ),
                priority: RecommendationPriority::Medium,
                action: RecommendationAction::Rightsize,
                profile_id: Some(profile.id.clone()),
            });
        }
    }

    recommendations
}
