//! Fixtures shared by unit tests

use crate::error::{EngineError, Result};
use crate::models::*;
use crate::store::{async_trait, InMemoryStore, InventorySource, MetricsSource, PlanningStore};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const KB_PER_GB: u64 = 1024 * 1024;

pub fn cluster(id: &str, organization_id: &str) -> Cluster {
    Cluster {
        id: id.to_string(),
        name: format!("cluster-{}", id),
        organization_id: organization_id.to_string(),
        configuration: ClusterConfiguration::default(),
        capacity: ClusterCapacity::default(),
        host_count: 0,
        is_active: true,
        last_sync: None,
    }
}

/// Connected, powered-on host with a single 1 TiB datastore
pub fn host(id: &str, cluster_id: &str, cores: u32, memory_mb: u64) -> Host {
    Host {
        id: id.to_string(),
        name: id.to_string(),
        cluster_id: cluster_id.to_string(),
        capacity: HostCapacity {
            cpu_cores: cores,
            cpu_mhz: cores as u64 * 2_000,
            memory_mb,
            datastores: vec![Datastore {
                name: format!("{}-ds1", id),
                capacity_bytes: 1024 * 1024 * 1024 * 1024,
                free_bytes: 512 * 1024 * 1024 * 1024,
            }],
        },
        utilization: HostUtilization::default(),
        connection_state: ConnectionState::Connected,
        power_state: PowerState::PoweredOn,
        maintenance_mode: false,
        is_active: true,
    }
}

/// Active VM in `org-1`, storage given in whole GB
pub fn vdi(id: &str, host_name: &str, cores: u32, memory_mb: u64, storage_gb: u64) -> Vdi {
    vdi_kb(id, host_name, cores, memory_mb, storage_gb * KB_PER_GB)
}

pub fn vdi_kb(id: &str, host_name: &str, cores: u32, memory_mb: u64, storage_kb: u64) -> Vdi {
    Vdi {
        id: id.to_string(),
        name: format!("desktop-{}", id),
        organization_id: "org-1".to_string(),
        esxi_host: host_name.to_string(),
        status: VdiStatus::Active,
        resource_allocation: ResourceAllocation {
            cpu: CpuAllocation {
                cores,
                reserved_mhz: None,
            },
            memory: MemoryAllocation {
                allocated_mb: memory_mb,
                reservation_mb: None,
            },
            storage: StorageAllocation {
                allocated_kb: storage_kb,
            },
            gpu: None,
        },
        assigned_user: None,
    }
}

pub fn sample_at(vdi_id: &str, timestamp: DateTime<Utc>, cpu: f64, memory: f64) -> UtilizationSample {
    UtilizationSample {
        vdi_id: vdi_id.to_string(),
        timestamp,
        cpu_percent: cpu,
        memory_percent: memory,
        storage_percent: 40.0,
    }
}

/// Curated profile with no instances
pub fn profile(id: &str, cluster_id: &str, cores: u32, memory_mb: u64, storage_gb: u64) -> AllocationProfile {
    AllocationProfile {
        id: id.to_string(),
        name: format!("profile-{}", id),
        organization_id: "org-1".to_string(),
        cluster_id: cluster_id.to_string(),
        resource_specs: ResourceSpecs {
            cpu_cores: cores,
            cpu_mhz: cores as u64 * 2_000,
            memory_mb,
            storage_gb,
        },
        instances: Vec::new(),
        allocation: ProfileAllocation::default(),
        auto_generated: false,
        is_active: true,
        tags: Vec::new(),
        utilization_stats: ProfileUtilizationStats::default(),
        last_calculated: None,
    }
}

/// Wraps an [`InMemoryStore`] and injects failures or stalls for chosen ids
pub struct FlakyInventory {
    inner: Arc<InMemoryStore>,
    failing: HashSet<String>,
    stalled: HashSet<String>,
    stalled_profiles: HashSet<String>,
}

impl FlakyInventory {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            failing: HashSet::new(),
            stalled: HashSet::new(),
            stalled_profiles: HashSet::new(),
        }
    }

    /// Host and VM lookups for this id return a source error
    pub fn fail_host(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    /// Host and VM lookups for this id hang well past any test timeout
    pub fn stall_host(mut self, id: &str) -> Self {
        self.stalled.insert(id.to_string());
        self
    }

    /// Sample lookups for this VM return a source error
    pub fn fail_vdi(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    /// Profile reads and writes for this cluster hang well past any test timeout
    pub fn stall_profiles(mut self, cluster_id: &str) -> Self {
        self.stalled_profiles.insert(cluster_id.to_string());
        self
    }

    async fn gate_profiles(&self, cluster_id: &str) {
        if self.stalled_profiles.contains(cluster_id) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }

    async fn gate(&self, id: &str) -> Result<()> {
        if self.stalled.contains(id) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.failing.contains(id) {
            return Err(EngineError::Source(format!("injected failure for {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl InventorySource for FlakyInventory {
    async fn host_ids(&self, cluster_id: &str) -> Result<Vec<String>> {
        self.inner.host_ids(cluster_id).await
    }

    async fn host(&self, host_id: &str) -> Result<Host> {
        self.gate(host_id).await?;
        self.inner.host(host_id).await
    }

    async fn vdis_on_host(&self, host_name: &str) -> Result<Vec<Vdi>> {
        self.gate(host_name).await?;
        self.inner.vdis_on_host(host_name).await
    }

    async fn vdis_for_organization(&self, organization_id: &str) -> Result<Vec<Vdi>> {
        self.inner.vdis_for_organization(organization_id).await
    }

    async fn vdi(&self, vdi_id: &str) -> Result<Vdi> {
        self.inner.vdi(vdi_id).await
    }
}

#[async_trait]
impl MetricsSource for FlakyInventory {
    async fn samples(
        &self,
        vdi_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UtilizationSample>> {
        self.gate(vdi_id).await?;
        self.inner.samples(vdi_id, start, end).await
    }
}

#[async_trait]
impl PlanningStore for FlakyInventory {
    async fn cluster(&self, cluster_id: &str) -> Result<Cluster> {
        self.inner.cluster(cluster_id).await
    }

    async fn clusters_for_organization(&self, organization_id: &str) -> Result<Vec<Cluster>> {
        self.inner.clusters_for_organization(organization_id).await
    }

    async fn active_clusters(&self) -> Result<Vec<Cluster>> {
        self.inner.active_clusters().await
    }

    async fn save_cluster(&self, cluster: Cluster) -> Result<()> {
        self.inner.save_cluster(cluster).await
    }

    async fn profiles_for_cluster(&self, cluster_id: &str) -> Result<Vec<AllocationProfile>> {
        self.gate_profiles(cluster_id).await;
        self.inner.profiles_for_cluster(cluster_id).await
    }

    async fn profile(&self, profile_id: &str) -> Result<AllocationProfile> {
        self.inner.profile(profile_id).await
    }

    async fn save_profile(&self, profile: AllocationProfile) -> Result<()> {
        self.gate_profiles(&profile.cluster_id).await;
        self.inner.save_profile(profile).await
    }

    async fn delete_profile(&self, profile_id: &str) -> Result<()> {
        self.inner.delete_profile(profile_id).await
    }
}
