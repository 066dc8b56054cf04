//! Allocation profile lifecycle
//!
//! Profiles are recomputed wholesale each cycle: the member list of a matched
//! profile is replaced, never patched, and the record is saved in one write.

use super::{efficiency, group_by_resources, max_allocation, GroupKey};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::{
    AllocationProfile, ProfileAllocation, ProfileInstance, ProfileUtilizationStats,
    ResourceCapacity, ResourceSpecs, UsageFigures, Vdi,
};
use crate::stats;
use crate::store::{
    collect_cluster_vdis, fetch_with_timeout, InventorySource, MetricsSource, PlanningStore,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Highest core count accepted for a curated profile
const MAX_PROFILE_CORES: u32 = 32;

/// Smallest memory accepted for a curated profile
const MIN_PROFILE_MEMORY_MB: u64 = 512;

const AUTO_PROFILE_TAGS: [&str; 2] = ["auto-generated", "cluster-analysis"];

/// Request to create a curated profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProfile {
    pub name: String,
    pub cluster_id: String,
    pub resource_specs: ResourceSpecs,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Clone)]
pub struct ProfileManager {
    inventory: Arc<dyn InventorySource>,
    metrics: Arc<dyn MetricsSource>,
    store: Arc<dyn PlanningStore>,
    config: Arc<EngineConfig>,
}

impl ProfileManager {
    pub fn new(
        inventory: Arc<dyn InventorySource>,
        metrics: Arc<dyn MetricsSource>,
        store: Arc<dyn PlanningStore>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            inventory,
            metrics,
            store,
            config,
        }
    }

    /// Discover recurring resource patterns in the cluster and reconcile them
    /// into profiles. Returns every profile created, updated or emptied.
    ///
    /// Active auto-generated profiles whose group no longer forms keep their
    /// identity but lose all instances.
    pub async fn generate_auto_profiles(&self, cluster_id: &str) -> Result<Vec<AllocationProfile>> {
        let timeout = self.config.fetch_timeout();
        let cluster =
            fetch_with_timeout(timeout, "cluster", cluster_id, self.store.cluster(cluster_id))
                .await?;

        let (vdis, skipped_hosts) =
            collect_cluster_vdis(self.inventory.as_ref(), cluster_id, timeout).await?;
        if vdis.iter().all(|v| !v.is_active()) {
            info!(cluster_id = %cluster_id, "No active VMs found for cluster");
        }

        let groups = group_by_resources(&vdis, self.config.min_group_size);
        let existing = self.cluster_profiles(cluster_id).await?;
        let keys: HashSet<GroupKey> = groups.keys().copied().collect();
        let mut claimed: HashSet<String> = HashSet::new();
        let mut created = 0usize;
        let mut reconciled = Vec::new();

        for (key, members) in groups {
            let instances: Vec<ProfileInstance> =
                members.iter().map(|v| ProfileInstance::from(*v)).collect();

            let mut profile = match match_profile(&existing, &claimed, &keys, &key) {
                Some(profile) => {
                    let mut profile = profile.clone();
                    refresh_specs(&mut profile, &key, &existing);
                    profile
                }
                None => {
                    let name = key.profile_name();
                    if let Some(clash) = existing.iter().find(|p| p.name == name) {
                        if clash.auto_generated {
                            debug!(cluster_id = %cluster_id, profile = %name, "Auto profile name already taken");
                        } else {
                            warn!(
                                cluster_id = %cluster_id,
                                profile = %name,
                                "Skipping auto profile, name belongs to a curated profile"
                            );
                        }
                        continue;
                    }
                    created += 1;
                    self.new_auto_profile(&cluster.organization_id, cluster_id, &key, members[0])
                }
            };

            claimed.insert(profile.id.clone());
            profile.replace_instances(instances);
            if let Some(stats) = self.profile_utilization(&profile.instances).await {
                profile.utilization_stats = stats;
            }
            reconciled.push(self.save_reconciled(profile, &cluster.capacity.available).await?);
        }

        let mut emptied = 0usize;
        for stale in existing
            .iter()
            .filter(|p| p.is_active && p.auto_generated && !claimed.contains(&p.id))
        {
            if stale.instances.is_empty() && stale.allocation.current == 0 {
                continue;
            }
            let mut profile = stale.clone();
            profile.replace_instances(Vec::new());
            profile.utilization_stats = ProfileUtilizationStats::default();
            emptied += 1;
            reconciled.push(self.save_reconciled(profile, &cluster.capacity.available).await?);
        }

        info!(
            cluster_id = %cluster_id,
            created = created,
            updated = reconciled.len() - created - emptied,
            emptied = emptied,
            skipped_hosts = skipped_hosts.len(),
            "Automatic profile generation completed"
        );
        Ok(reconciled)
    }

    /// Recompute the maximum allocation and persist the profile in one write
    async fn save_reconciled(
        &self,
        mut profile: AllocationProfile,
        available: &ResourceCapacity,
    ) -> Result<AllocationProfile> {
        profile.allocation.maximum =
            max_allocation(&profile.resource_specs, available, profile.allocation.current);
        profile.last_calculated = Some(Utc::now());

        self.save(profile.clone()).await?;
        debug!(
            cluster_id = %profile.cluster_id,
            profile = %profile.name,
            instances = profile.allocation.current,
            maximum = profile.allocation.maximum,
            "Profile reconciled"
        );
        Ok(profile)
    }

    async fn save(&self, profile: AllocationProfile) -> Result<()> {
        let id = profile.id.clone();
        fetch_with_timeout(
            self.config.fetch_timeout(),
            "profile save",
            &id,
            self.store.save_profile(profile),
        )
        .await
    }

    async fn cluster_profiles(&self, cluster_id: &str) -> Result<Vec<AllocationProfile>> {
        fetch_with_timeout(
            self.config.fetch_timeout(),
            "profiles",
            cluster_id,
            self.store.profiles_for_cluster(cluster_id),
        )
        .await
    }

    fn new_auto_profile(
        &self,
        organization_id: &str,
        cluster_id: &str,
        key: &GroupKey,
        sample: &Vdi,
    ) -> AllocationProfile {
        let alloc = &sample.resource_allocation;
        AllocationProfile {
            id: uuid::Uuid::new_v4().to_string(),
            name: key.profile_name(),
            organization_id: organization_id.to_string(),
            cluster_id: cluster_id.to_string(),
            resource_specs: ResourceSpecs {
                cpu_cores: key.cpu_cores,
                cpu_mhz: alloc
                    .cpu
                    .reserved_mhz
                    .unwrap_or(key.cpu_cores as u64 * self.config.default_mhz_per_core),
                memory_mb: alloc.memory.allocated_mb,
                storage_gb: key.storage_gb,
            },
            instances: Vec::new(),
            allocation: ProfileAllocation::default(),
            auto_generated: true,
            is_active: true,
            tags: AUTO_PROFILE_TAGS.iter().map(|t| t.to_string()).collect(),
            utilization_stats: ProfileUtilizationStats::default(),
            last_calculated: None,
        }
    }

    /// Recompute the maximum allocation of every active profile against the
    /// cluster's persisted available capacity
    pub async fn refresh_allocations(&self, cluster_id: &str) -> Result<Vec<AllocationProfile>> {
        let timeout = self.config.fetch_timeout();
        let cluster =
            fetch_with_timeout(timeout, "cluster", cluster_id, self.store.cluster(cluster_id))
                .await?;
        let profiles = self.cluster_profiles(cluster_id).await?;

        let mut refreshed = Vec::new();
        for mut profile in profiles.into_iter().filter(|p| p.is_active) {
            profile.allocation.maximum = max_allocation(
                &profile.resource_specs,
                &cluster.capacity.available,
                profile.allocation.current,
            );
            profile.last_calculated = Some(Utc::now());
            match self.save(profile.clone()).await {
                Ok(()) => refreshed.push(profile),
                Err(e) => warn!(
                    cluster_id = %cluster_id,
                    profile = %profile.name,
                    error = %e,
                    "Failed to save profile allocation"
                ),
            }
        }

        info!(cluster_id = %cluster_id, profiles = refreshed.len(), "Updated allocation profiles");
        Ok(refreshed)
    }

    /// Active profiles of a cluster
    pub async fn list_profiles(&self, cluster_id: &str) -> Result<Vec<AllocationProfile>> {
        let timeout = self.config.fetch_timeout();
        fetch_with_timeout(timeout, "cluster", cluster_id, self.store.cluster(cluster_id)).await?;
        Ok(self
            .cluster_profiles(cluster_id)
            .await?
            .into_iter()
            .filter(|p| p.is_active)
            .collect())
    }

    /// Create a curated, non-auto-generated profile
    pub async fn create_profile(&self, request: NewProfile) -> Result<AllocationProfile> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(EngineError::validation("profile name must not be empty"));
        }
        let specs = request.resource_specs;
        if !(1..=MAX_PROFILE_CORES).contains(&specs.cpu_cores) {
            return Err(EngineError::validation(format!(
                "cpu cores must be within 1..={}, got {}",
                MAX_PROFILE_CORES, specs.cpu_cores
            )));
        }
        if specs.memory_mb < MIN_PROFILE_MEMORY_MB {
            return Err(EngineError::validation(format!(
                "memory must be at least {} MB, got {}",
                MIN_PROFILE_MEMORY_MB, specs.memory_mb
            )));
        }

        let cluster = fetch_with_timeout(
            self.config.fetch_timeout(),
            "cluster",
            &request.cluster_id,
            self.store.cluster(&request.cluster_id),
        )
        .await?;
        let existing = self.cluster_profiles(&cluster.id).await?;
        if existing.iter().any(|p| p.name == name) {
            return Err(EngineError::validation(format!(
                "profile {} already exists in cluster {}",
                name, cluster.id
            )));
        }

        let profile = AllocationProfile {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            organization_id: cluster.organization_id.clone(),
            cluster_id: cluster.id.clone(),
            resource_specs: specs,
            instances: Vec::new(),
            allocation: ProfileAllocation {
                current: 0,
                maximum: max_allocation(&specs, &cluster.capacity.available, 0),
            },
            auto_generated: false,
            is_active: true,
            tags: request.tags,
            utilization_stats: ProfileUtilizationStats::default(),
            last_calculated: Some(Utc::now()),
        };
        self.save(profile.clone()).await?;

        info!(cluster_id = %cluster.id, profile = %profile.name, "Created allocation profile");
        Ok(profile)
    }

    /// Delete a profile, refusing while it still has instances
    pub async fn delete_profile(&self, profile_id: &str) -> Result<()> {
        let timeout = self.config.fetch_timeout();
        let profile =
            fetch_with_timeout(timeout, "profile", profile_id, self.store.profile(profile_id))
                .await?;
        if profile.allocation.current > 0 {
            return Err(EngineError::ProfileInUse {
                id: profile.id,
                instances: profile.allocation.current,
            });
        }
        fetch_with_timeout(
            timeout,
            "profile delete",
            profile_id,
            self.store.delete_profile(profile_id),
        )
        .await?;
        info!(profile_id = %profile_id, "Deleted allocation profile");
        Ok(())
    }

    /// Average and peak usage across members over the trailing stats window.
    ///
    /// Averages are taken per VM first, then across VMs. Returns `None` when
    /// no member has samples.
    pub async fn profile_utilization(
        &self,
        instances: &[ProfileInstance],
    ) -> Option<ProfileUtilizationStats> {
        let end = Utc::now();
        let start = end - self.config.profile_stats_window();
        let timeout = self.config.fetch_timeout();

        let mut averages = Vec::new();
        let mut peaks = Vec::new();
        for instance in instances {
            let samples = match fetch_with_timeout(
                timeout,
                "samples",
                &instance.vdi_id,
                self.metrics.samples(&instance.vdi_id, start, end),
            )
            .await
            {
                Ok(samples) => samples,
                Err(e) => {
                    warn!(vdi_id = %instance.vdi_id, error = %e, "Skipping profile member metrics");
                    continue;
                }
            };
            if samples.is_empty() {
                continue;
            }
            let cpu: Vec<f64> = samples.iter().map(|s| s.cpu_percent).collect();
            let memory: Vec<f64> = samples.iter().map(|s| s.memory_percent).collect();
            let storage: Vec<f64> = samples.iter().map(|s| s.storage_percent).collect();
            averages.push(UsageFigures {
                cpu: stats::mean(&cpu),
                memory: stats::mean(&memory),
                storage: stats::mean(&storage),
            });
            peaks.push(UsageFigures {
                cpu: stats::max(&cpu),
                memory: stats::max(&memory),
                storage: stats::max(&storage),
            });
        }

        if averages.is_empty() {
            return None;
        }

        let column = |figures: &[UsageFigures], pick: fn(&UsageFigures) -> f64| -> Vec<f64> {
            figures.iter().map(pick).collect()
        };
        let average = UsageFigures {
            cpu: stats::mean(&column(&averages, |f| f.cpu)),
            memory: stats::mean(&column(&averages, |f| f.memory)),
            storage: stats::mean(&column(&averages, |f| f.storage)),
        };
        let peak = UsageFigures {
            cpu: stats::max(&column(&peaks, |f| f.cpu)),
            memory: stats::max(&column(&peaks, |f| f.memory)),
            storage: stats::max(&column(&peaks, |f| f.storage)),
        };

        Some(ProfileUtilizationStats {
            average,
            peak,
            efficiency: efficiency(average.cpu),
        })
    }
}

/// Active, unclaimed profile for a group: an exact footprint match first,
/// then a profile sharing the group's cores and whole GB of memory whose own
/// storage bucket no surviving group claims.
fn match_profile<'a>(
    existing: &'a [AllocationProfile],
    claimed: &HashSet<String>,
    keys: &HashSet<GroupKey>,
    key: &GroupKey,
) -> Option<&'a AllocationProfile> {
    let candidates = || {
        existing.iter().filter(|p| {
            p.is_active
                && !claimed.contains(&p.id)
                && p.resource_specs.cpu_cores == key.cpu_cores
                && p.resource_specs.memory_mb / 1024 == key.memory_gb
        })
    };
    candidates()
        .find(|p| p.resource_specs.storage_gb == key.storage_gb)
        .or_else(|| {
            candidates().find(|p| {
                !keys.contains(&GroupKey {
                    storage_gb: p.resource_specs.storage_gb,
                    ..*key
                })
            })
        })
}

/// Align a matched profile's storage footprint with its current group.
///
/// An auto-generated profile also takes the group's name unless another
/// profile already holds it.
fn refresh_specs(
    profile: &mut AllocationProfile,
    key: &GroupKey,
    existing: &[AllocationProfile],
) {
    if profile.resource_specs.storage_gb == key.storage_gb {
        return;
    }
    debug!(
        profile = %profile.name,
        from_gb = profile.resource_specs.storage_gb,
        to_gb = key.storage_gb,
        "Profile storage footprint changed"
    );
    profile.resource_specs.storage_gb = key.storage_gb;
    if profile.auto_generated {
        let name = key.profile_name();
        if !existing.iter().any(|p| p.name == name && p.id != profile.id) {
            profile.name = name;
        }
    }
}
