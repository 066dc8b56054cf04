//! In-memory store backed by a JSON inventory snapshot
//!
//! Implements every persistence port so the daemon, the CLI and the tests
//! can run the engine without a database.

use super::{InventorySource, MetricsSource, PlanningStore};
use crate::error::{EngineError, Result};
use crate::models::{AllocationProfile, Cluster, Host, UtilizationSample, Vdi};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::debug;

/// Serialized form of everything the store holds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySnapshot {
    #[serde(default)]
    pub clusters: Vec<Cluster>,
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub vdis: Vec<Vdi>,
    #[serde(default)]
    pub samples: Vec<UtilizationSample>,
    #[serde(default)]
    pub profiles: Vec<AllocationProfile>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    clusters: RwLock<HashMap<String, Cluster>>,
    hosts: RwLock<HashMap<String, Host>>,
    vdis: RwLock<HashMap<String, Vdi>>,
    samples: RwLock<HashMap<String, Vec<UtilizationSample>>>,
    profiles: RwLock<HashMap<String, AllocationProfile>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: InventorySnapshot) -> Self {
        let mut samples: HashMap<String, Vec<UtilizationSample>> = HashMap::new();
        for sample in snapshot.samples {
            samples.entry(sample.vdi_id.clone()).or_default().push(sample);
        }
        for series in samples.values_mut() {
            series.sort_by_key(|s| s.timestamp);
        }

        Self {
            clusters: RwLock::new(by_id(snapshot.clusters, |c| c.id.clone())),
            hosts: RwLock::new(by_id(snapshot.hosts, |h| h.id.clone())),
            vdis: RwLock::new(by_id(snapshot.vdis, |v| v.id.clone())),
            samples: RwLock::new(samples),
            profiles: RwLock::new(by_id(snapshot.profiles, |p| p.id.clone())),
        }
    }

    /// Load a snapshot from a JSON file
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot: InventorySnapshot =
            serde_json::from_str(&content).context("Failed to parse snapshot")?;
        debug!(
            path = %path.display(),
            clusters = snapshot.clusters.len(),
            hosts = snapshot.hosts.len(),
            vdis = snapshot.vdis.len(),
            "Loaded inventory snapshot"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the current state back as a JSON snapshot
    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let snapshot = self.snapshot().await;
        let content =
            serde_json::to_string_pretty(&snapshot).context("Failed to serialize snapshot")?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        Ok(())
    }

    pub async fn snapshot(&self) -> InventorySnapshot {
        let mut snapshot = InventorySnapshot {
            clusters: self.clusters.read().await.values().cloned().collect(),
            hosts: self.hosts.read().await.values().cloned().collect(),
            vdis: self.vdis.read().await.values().cloned().collect(),
            samples: self
                .samples
                .read()
                .await
                .values()
                .flatten()
                .cloned()
                .collect(),
            profiles: self.profiles.read().await.values().cloned().collect(),
        };
        snapshot.clusters.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.hosts.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.vdis.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot
            .samples
            .sort_by(|a, b| (&a.vdi_id, a.timestamp).cmp(&(&b.vdi_id, b.timestamp)));
        snapshot.profiles.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot
    }

    pub async fn upsert_cluster(&self, cluster: Cluster) {
        self.clusters.write().await.insert(cluster.id.clone(), cluster);
    }

    pub async fn upsert_host(&self, host: Host) {
        self.hosts.write().await.insert(host.id.clone(), host);
    }

    pub async fn upsert_vdi(&self, vdi: Vdi) {
        self.vdis.write().await.insert(vdi.id.clone(), vdi);
    }

    /// Append a sample, keeping the series ordered by time
    pub async fn record_sample(&self, sample: UtilizationSample) {
        let mut samples = self.samples.write().await;
        let series = samples.entry(sample.vdi_id.clone()).or_default();
        let idx = series.partition_point(|s| s.timestamp <= sample.timestamp);
        series.insert(idx, sample);
    }
}

fn by_id<T>(items: Vec<T>, key: impl Fn(&T) -> String) -> HashMap<String, T> {
    items.into_iter().map(|item| (key(&item), item)).collect()
}

#[async_trait]
impl InventorySource for InMemoryStore {
    async fn host_ids(&self, cluster_id: &str) -> Result<Vec<String>> {
        let hosts = self.hosts.read().await;
        let mut ids: Vec<String> = hosts
            .values()
            .filter(|h| h.cluster_id == cluster_id)
            .map(|h| h.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn host(&self, host_id: &str) -> Result<Host> {
        self.hosts
            .read()
            .await
            .get(host_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("host", host_id))
    }

    async fn vdis_on_host(&self, host_name: &str) -> Result<Vec<Vdi>> {
        let vdis = self.vdis.read().await;
        let mut found: Vec<Vdi> = vdis
            .values()
            .filter(|v| v.esxi_host == host_name)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn vdis_for_organization(&self, organization_id: &str) -> Result<Vec<Vdi>> {
        let vdis = self.vdis.read().await;
        let mut found: Vec<Vdi> = vdis
            .values()
            .filter(|v| v.organization_id == organization_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn vdi(&self, vdi_id: &str) -> Result<Vdi> {
        self.vdis
            .read()
            .await
            .get(vdi_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("vdi", vdi_id))
    }
}

#[async_trait]
impl MetricsSource for InMemoryStore {
    async fn samples(
        &self,
        vdi_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UtilizationSample>> {
        let samples = self.samples.read().await;
        Ok(samples
            .get(vdi_id)
            .map(|series| {
                series
                    .iter()
                    .filter(|s| s.timestamp >= start && s.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl PlanningStore for InMemoryStore {
    async fn cluster(&self, cluster_id: &str) -> Result<Cluster> {
        self.clusters
            .read()
            .await
            .get(cluster_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("cluster", cluster_id))
    }

    async fn clusters_for_organization(&self, organization_id: &str) -> Result<Vec<Cluster>> {
        let clusters = self.clusters.read().await;
        let mut found: Vec<Cluster> = clusters
            .values()
            .filter(|c| c.organization_id == organization_id && c.is_active)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn active_clusters(&self) -> Result<Vec<Cluster>> {
        let clusters = self.clusters.read().await;
        let mut found: Vec<Cluster> = clusters.values().filter(|c| c.is_active).cloned().collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn save_cluster(&self, cluster: Cluster) -> Result<()> {
        self.clusters.write().await.insert(cluster.id.clone(), cluster);
        Ok(())
    }

    async fn profiles_for_cluster(&self, cluster_id: &str) -> Result<Vec<AllocationProfile>> {
        let profiles = self.profiles.read().await;
        let mut found: Vec<AllocationProfile> = profiles
            .values()
            .filter(|p| p.cluster_id == cluster_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn profile(&self, profile_id: &str) -> Result<AllocationProfile> {
        self.profiles
            .read()
            .await
            .get(profile_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("profile", profile_id))
    }

    async fn save_profile(&self, profile: AllocationProfile) -> Result<()> {
        self.profiles.write().await.insert(profile.id.clone(), profile);
        Ok(())
    }

    async fn delete_profile(&self, profile_id: &str) -> Result<()> {
        self.profiles
            .write()
            .await
            .remove(profile_id)
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found("profile", profile_id))
    }
}
