//! Cluster capacity rollup
//!
//! Sums eligible host capacity and active VM allocations into a cluster's
//! total / allocated / available figures, and derives utilization views and
//! capacity recommendations from the persisted result.

mod advisor;
mod aggregator;

pub use advisor::{
    capacity_recommendations, CapacityRecommendation, RecommendationAction,
    RecommendationCategory, RecommendationKind, RecommendationPriority,
};
pub use aggregator::{CapacityAggregator, ClusterCapacitySnapshot, SnapshotStatus};

use crate::models::{ClusterCapacity, Host, ResourceCapacity, UtilizationTarget, Vdi};
use serde::{Deserialize, Serialize};

/// Elementwise sum of host capacity
pub fn aggregate_host_capacity<'a>(hosts: impl IntoIterator<Item = &'a Host>) -> ResourceCapacity {
    hosts
        .into_iter()
        .fold(ResourceCapacity::default(), |total, host| ResourceCapacity {
            cpu_cores: total.cpu_cores + host.capacity.cpu_cores as u64,
            cpu_mhz: total.cpu_mhz + host.capacity.cpu_mhz,
            memory_mb: total.memory_mb + host.capacity.memory_mb,
            storage_gb: total.storage_gb + host.capacity.storage_gb(),
        })
}

/// Elementwise sum of active VM allocations
pub fn aggregate_allocations<'a>(vdis: impl IntoIterator<Item = &'a Vdi>) -> ResourceCapacity {
    vdis.into_iter()
        .filter(|vdi| vdi.is_active())
        .fold(ResourceCapacity::default(), |total, vdi| {
            let alloc = &vdi.resource_allocation;
            ResourceCapacity {
                cpu_cores: total.cpu_cores + alloc.cpu.cores as u64,
                cpu_mhz: total.cpu_mhz + alloc.cpu.reserved_mhz.unwrap_or(0),
                memory_mb: total.memory_mb + alloc.memory.allocated_mb,
                storage_gb: total.storage_gb + alloc.storage.gb(),
            }
        })
}

/// `max(0, floor(total * target / 100) - allocated)` per dimension
pub fn available_capacity(
    total: &ResourceCapacity,
    allocated: &ResourceCapacity,
    target: &UtilizationTarget,
) -> ResourceCapacity {
    let usable = |value: f64, pct: f64| (value * pct / 100.0).floor();
    ResourceCapacity {
        cpu_cores: (usable(total.cpu_cores as f64, target.cpu) as u64)
            .saturating_sub(allocated.cpu_cores),
        cpu_mhz: (usable(total.cpu_mhz as f64, target.cpu) as u64)
            .saturating_sub(allocated.cpu_mhz),
        memory_mb: (usable(total.memory_mb as f64, target.memory) as u64)
            .saturating_sub(allocated.memory_mb),
        storage_gb: (usable(total.storage_gb, target.storage) - allocated.storage_gb).max(0.0),
    }
}

/// Allocated share of one resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UtilizationFigure {
    pub percentage: f64,
    pub allocated: f64,
    pub total: f64,
}

impl UtilizationFigure {
    fn new(allocated: f64, total: f64) -> Self {
        let percentage = if total > 0.0 {
            allocated / total * 100.0
        } else {
            0.0
        };
        Self {
            percentage,
            allocated,
            total,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterUtilization {
    pub cpu: UtilizationFigure,
    pub memory: UtilizationFigure,
    pub storage: UtilizationFigure,
}

/// Allocated over total, per resource
pub fn cluster_utilization(capacity: &ClusterCapacity) -> ClusterUtilization {
    ClusterUtilization {
        cpu: UtilizationFigure::new(
            capacity.allocated.cpu_cores as f64,
            capacity.total.cpu_cores as f64,
        ),
        memory: UtilizationFigure::new(
            capacity.allocated.memory_mb as f64,
            capacity.total.memory_mb as f64,
        ),
        storage: UtilizationFigure::new(capacity.allocated.storage_gb, capacity.total.storage_gb),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VdiStatus;
    use crate::testing::{host, vdi};

    #[test]
    fn test_available_capacity_example() {
        let total = ResourceCapacity {
            cpu_cores: 100,
            cpu_mhz: 200_000,
            memory_mb: 409_600,
            storage_gb: 10_000.0,
        };
        let allocated = ResourceCapacity {
            cpu_cores: 60,
            cpu_mhz: 0,
            memory_mb: 100_000,
            storage_gb: 500.0,
        };
        let available = available_capacity(&total, &allocated, &UtilizationTarget::default());
        assert_eq!(available.cpu_cores, 25);
        assert_eq!(available.cpu_mhz, 170_000);
        assert_eq!(available.memory_mb, 248_160);
        assert!((available.storage_gb - 8_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_available_never_negative() {
        let total = ResourceCapacity {
            cpu_cores: 10,
            cpu_mhz: 1_000,
            memory_mb: 1_024,
            storage_gb: 10.0,
        };
        let allocated = ResourceCapacity {
            cpu_cores: 40,
            cpu_mhz: 5_000,
            memory_mb: 8_192,
            storage_gb: 100.0,
        };
        let available = available_capacity(&total, &allocated, &UtilizationTarget::default());
        assert_eq!(available, ResourceCapacity::default());
    }

    #[test]
    fn test_target_floors_before_subtracting() {
        // 7 * 0.85 = 5.95 -> 5 usable cores
        let total = ResourceCapacity {
            cpu_cores: 7,
            ..Default::default()
        };
        let allocated = ResourceCapacity {
            cpu_cores: 2,
            ..Default::default()
        };
        let available = available_capacity(&total, &allocated, &UtilizationTarget::default());
        assert_eq!(available.cpu_cores, 3);
    }

    #[test]
    fn test_allocations_only_count_active_vms() {
        let mut inactive = vdi("v2", "h1", 8, 16_384, 200);
        inactive.status = VdiStatus::Inactive;
        let vms = vec![vdi("v1", "h1", 4, 8_192, 100), inactive];

        let allocated = aggregate_allocations(&vms);
        assert_eq!(allocated.cpu_cores, 4);
        assert_eq!(allocated.memory_mb, 8_192);
        assert!((allocated.storage_gb - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_host_capacity_sum() {
        let hosts = vec![host("h1", "c1", 16, 65_536), host("h2", "c1", 32, 131_072)];
        let total = aggregate_host_capacity(&hosts);
        assert_eq!(total.cpu_cores, 48);
        assert_eq!(total.memory_mb, 196_608);
        assert!(total.storage_gb > 0.0);
    }

    #[test]
    fn test_utilization_with_empty_total() {
        let util = cluster_utilization(&ClusterCapacity::default());
        assert_eq!(util.cpu.percentage, 0.0);
        assert_eq!(util.storage.percentage, 0.0);
    }
}
