//! Allocation profiles
//!
//! Groups VMs into equivalence classes by rounded resource specs and sizes
//! each class against the cluster's available capacity.

mod manager;

pub use manager::{NewProfile, ProfileManager};

use crate::models::{ResourceCapacity, ResourceSpecs, Vdi};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bucket identifying a group: whole cores, whole GB of memory, whole GB of storage.
///
/// Buckets are floor divisions, so two VMs a few MB apart split when they
/// straddle a GB boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub cpu_cores: u32,
    pub memory_gb: u64,
    pub storage_gb: u64,
}

impl GroupKey {
    pub fn of(vdi: &Vdi) -> Self {
        let alloc = &vdi.resource_allocation;
        Self {
            cpu_cores: alloc.cpu.cores,
            memory_gb: alloc.memory.allocated_mb / 1024,
            storage_gb: alloc.storage.whole_gb(),
        }
    }

    /// Deterministic name for an auto-generated profile
    pub fn profile_name(&self) -> String {
        format!(
            "Auto-{}vCPU-{}GB-{}GB",
            self.cpu_cores, self.memory_gb, self.storage_gb
        )
    }
}

/// Bucket active VMs by [`GroupKey`], keeping groups of at least `min_size`
pub fn group_by_resources(vdis: &[Vdi], min_size: usize) -> BTreeMap<GroupKey, Vec<&Vdi>> {
    let mut groups: BTreeMap<GroupKey, Vec<&Vdi>> = BTreeMap::new();
    for vdi in vdis.iter().filter(|v| v.is_active()) {
        groups.entry(GroupKey::of(vdi)).or_default().push(vdi);
    }
    groups.retain(|_, members| members.len() >= min_size);
    groups
}

/// Maximum instance count of a profile: whole additional instances that fit
/// into the available capacity, bounded by the scarcest resource, plus the
/// instances already running.
///
/// A zero resource dimension leaves no room for additional instances.
pub fn max_allocation(specs: &ResourceSpecs, available: &ResourceCapacity, current: u32) -> u32 {
    let ratios = [
        ratio(available.cpu_cores as f64, specs.cpu_cores as f64),
        ratio(available.memory_mb as f64, specs.memory_mb as f64),
        ratio(available.storage_gb, specs.storage_gb as f64),
    ];
    let additional = ratios
        .into_iter()
        .fold(f64::INFINITY, f64::min)
        .floor()
        .max(0.0);
    (additional as u32).saturating_add(current)
}

fn ratio(available: f64, required: f64) -> f64 {
    if required <= 0.0 {
        0.0
    } else {
        available / required
    }
}

/// Efficiency score from average CPU usage.
///
/// 50% usage scores 100, falling linearly to 0 at 0% and 100%.
pub fn efficiency(avg_cpu_percent: f64) -> f64 {
    (100.0 - (avg_cpu_percent - 50.0).abs() * 2.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VdiStatus;
    use crate::testing::{vdi, vdi_kb};

    #[test]
    fn test_max_allocation_example() {
        let specs = ResourceSpecs {
            cpu_cores: 2,
            cpu_mhz: 4_000,
            memory_mb: 4_096,
            storage_gb: 50,
        };
        let available = ResourceCapacity {
            cpu_cores: 10,
            cpu_mhz: 0,
            memory_mb: 40_960,
            storage_gb: 500.0,
        };
        assert_eq!(max_allocation(&specs, &available, 3), 8);
    }

    #[test]
    fn test_max_allocation_zero_divisor() {
        let specs = ResourceSpecs {
            cpu_cores: 2,
            cpu_mhz: 0,
            memory_mb: 4_096,
            storage_gb: 0,
        };
        let available = ResourceCapacity {
            cpu_cores: 10,
            cpu_mhz: 0,
            memory_mb: 40_960,
            storage_gb: 500.0,
        };
        assert_eq!(max_allocation(&specs, &available, 4), 4);
    }

    #[test]
    fn test_max_allocation_no_headroom() {
        let specs = ResourceSpecs {
            cpu_cores: 4,
            cpu_mhz: 0,
            memory_mb: 8_192,
            storage_gb: 100,
        };
        assert_eq!(max_allocation(&specs, &ResourceCapacity::default(), 6), 6);
    }

    #[test]
    fn test_grouping_by_gb_floor() {
        let vms = vec![
            vdi_kb("a", "h1", 4, 8_192, 104_857_600),
            vdi_kb("b", "h1", 4, 9_000, 104_960_000),
            vdi_kb("c", "h1", 4, 9_217, 104_857_600),
            vdi_kb("d", "h1", 4, 9_300, 105_000_000),
        ];
        let groups = group_by_resources(&vms, 1);

        let eight = GroupKey {
            cpu_cores: 4,
            memory_gb: 8,
            storage_gb: 100,
        };
        let nine = GroupKey {
            cpu_cores: 4,
            memory_gb: 9,
            storage_gb: 100,
        };
        let ids = |key: &GroupKey| -> Vec<&str> {
            groups[key].iter().map(|v| v.id.as_str()).collect()
        };
        assert_eq!(ids(&eight), vec!["a", "b"]);
        assert_eq!(ids(&nine), vec!["c", "d"]);
    }

    #[test]
    fn test_one_mb_apart_split_at_boundary() {
        let below = GroupKey::of(&vdi("a", "h1", 4, 8_191, 100));
        let at = GroupKey::of(&vdi("b", "h1", 4, 8_192, 100));
        assert_ne!(below, at);
        assert_eq!(below.memory_gb, 7);
        assert_eq!(at.memory_gb, 8);
    }

    #[test]
    fn test_singletons_and_inactive_discarded() {
        let mut inactive = vdi("c", "h1", 2, 4_096, 50);
        inactive.status = VdiStatus::Inactive;
        let vms = vec![
            vdi("a", "h1", 2, 4_096, 50),
            vdi("b", "h1", 8, 32_768, 200),
            inactive,
        ];
        assert!(group_by_resources(&vms, 2).is_empty());
    }

    #[test]
    fn test_profile_name() {
        let key = GroupKey::of(&vdi("a", "h1", 4, 8_192, 100));
        assert_eq!(key.profile_name(), "Auto-4vCPU-8GB-100GB");
    }

    #[test]
    fn test_efficiency_curve() {
        assert_eq!(efficiency(50.0), 100.0);
        assert_eq!(efficiency(25.0), 50.0);
        assert_eq!(efficiency(75.0), 50.0);
        assert_eq!(efficiency(0.0), 0.0);
        assert_eq!(efficiency(100.0), 0.0);
    }
}
