//! Reports assembled by the orchestrator

use crate::capacity::{
    cluster_utilization, CapacityRecommendation, ClusterCapacitySnapshot, ClusterUtilization,
};
use crate::models::{
    AllocationProfile, Cluster, ClusterCapacity, ProfileAllocation, ResourceSpecs,
};
use crate::sizing::BulkSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleOptions {
    /// Run bulk sizing over the cluster's VMs after profile reconciliation
    pub analyze_sizing: bool,
    /// Sizing lookback; the engine default when unset
    pub hours: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cluster_id: String,
    pub capacity: ClusterCapacitySnapshot,
    pub profiles: Vec<AllocationProfile>,
    pub recommendations: Vec<CapacityRecommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizing: Option<BulkSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another run held the cluster; this request was dropped
    Skipped { cluster_id: String },
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: String,
    pub name: String,
    pub resource_specs: ResourceSpecs,
    pub allocation: ProfileAllocation,
    pub available_slots: u32,
    pub efficiency: f64,
    pub auto_generated: bool,
}

impl From<&AllocationProfile> for ProfileSummary {
    fn from(profile: &AllocationProfile) -> Self {
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            resource_specs: profile.resource_specs,
            allocation: profile.allocation,
            available_slots: profile.available_slots(),
            efficiency: profile.utilization_stats.efficiency,
            auto_generated: profile.auto_generated,
        }
    }
}

/// Capacity picture of one cluster for an organization overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub cluster_id: String,
    pub name: String,
    pub capacity: ClusterCapacity,
    pub utilization: ClusterUtilization,
    pub host_count: u32,
    pub last_sync: Option<DateTime<Utc>>,
    pub profiles: Vec<ProfileSummary>,
}

impl ClusterStatus {
    pub fn new(cluster: &Cluster, profiles: &[AllocationProfile]) -> Self {
        Self {
            cluster_id: cluster.id.clone(),
            name: cluster.name.clone(),
            capacity: cluster.capacity,
            utilization: cluster_utilization(&cluster.capacity),
            host_count: cluster.host_count,
            last_sync: cluster.last_sync,
            profiles: profiles
                .iter()
                .filter(|p| p.is_active)
                .map(ProfileSummary::from)
                .collect(),
        }
    }
}
