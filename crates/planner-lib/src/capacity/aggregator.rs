//! Capacity aggregation for a single cluster

use super::{aggregate_allocations, aggregate_host_capacity, available_capacity};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::{ClusterCapacity, Host, Vdi};
use crate::store::{fetch_with_timeout, InventorySource, PlanningStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    /// Capacity was recomputed and persisted
    Updated,
    /// No eligible hosts; the previously persisted capacity is returned untouched
    NoEligibleHosts,
}

/// Result of one aggregation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCapacitySnapshot {
    pub cluster_id: String,
    pub status: SnapshotStatus,
    pub capacity: ClusterCapacity,
    pub host_count: u32,
    /// Hosts whose fetch failed or timed out and were left out
    pub skipped_hosts: Vec<String>,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Rolls host capacity into cluster capacity
#[derive(Clone)]
pub struct CapacityAggregator {
    inventory: Arc<dyn InventorySource>,
    store: Arc<dyn PlanningStore>,
    config: Arc<EngineConfig>,
}

impl CapacityAggregator {
    pub fn new(
        inventory: Arc<dyn InventorySource>,
        store: Arc<dyn PlanningStore>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            inventory,
            store,
            config,
        }
    }

    /// Recompute and persist total / allocated / available capacity.
    ///
    /// Individual host and VM fetch failures are skipped; aggregation proceeds
    /// on whatever arrived.
    pub async fn recalculate(&self, cluster_id: &str) -> Result<ClusterCapacitySnapshot> {
        let timeout = self.config.fetch_timeout();
        let mut cluster = fetch_with_timeout(
            timeout,
            "cluster",
            cluster_id,
            self.store.cluster(cluster_id),
        )
        .await?;

        let target = cluster.configuration.utilization_target;
        if let Some((dimension, value)) = target.out_of_range() {
            return Err(EngineError::validation(format!(
                "cluster {} {} utilization target {} outside 50..=95",
                cluster_id, dimension, value
            )));
        }

        let host_ids = fetch_with_timeout(
            timeout,
            "host list",
            cluster_id,
            self.inventory.host_ids(cluster_id),
        )
        .await?;

        let (hosts, skipped_hosts) = self.fetch_hosts(cluster_id, &host_ids).await;
        let eligible: Vec<&Host> = hosts.iter().filter(|h| h.is_eligible()).collect();

        if eligible.is_empty() {
            warn!(
                cluster_id = %cluster_id,
                registered_hosts = host_ids.len(),
                "No eligible hosts found, keeping previous capacity"
            );
            return Ok(ClusterCapacitySnapshot {
                cluster_id: cluster_id.to_string(),
                status: SnapshotStatus::NoEligibleHosts,
                capacity: cluster.capacity,
                host_count: cluster.host_count,
                skipped_hosts,
                last_sync: cluster.last_sync,
            });
        }

        let vdis = self.fetch_vdis(cluster_id, &eligible).await;

        let total = aggregate_host_capacity(eligible.iter().copied());
        let allocated = aggregate_allocations(&vdis);
        let available = available_capacity(&total, &allocated, &target);

        cluster.capacity = ClusterCapacity {
            total,
            allocated,
            available,
        };
        cluster.host_count = eligible.len() as u32;
        cluster.last_sync = Some(Utc::now());

        let snapshot = ClusterCapacitySnapshot {
            cluster_id: cluster_id.to_string(),
            status: SnapshotStatus::Updated,
            capacity: cluster.capacity,
            host_count: cluster.host_count,
            skipped_hosts,
            last_sync: cluster.last_sync,
        };

        fetch_with_timeout(
            timeout,
            "cluster write",
            cluster_id,
            self.store.save_cluster(cluster),
        )
        .await?;

        info!(
            cluster_id = %cluster_id,
            hosts = snapshot.host_count,
            skipped_hosts = snapshot.skipped_hosts.len(),
            total_cores = total.cpu_cores,
            allocated_cores = allocated.cpu_cores,
            available_cores = available.cpu_cores,
            available_memory_mb = available.memory_mb,
            available_storage_gb = available.storage_gb,
            "Capacity recalculated"
        );

        Ok(snapshot)
    }

    async fn fetch_hosts(&self, cluster_id: &str, host_ids: &[String]) -> (Vec<Host>, Vec<String>) {
        let timeout = self.config.fetch_timeout();
        let mut hosts = Vec::with_capacity(host_ids.len());
        let mut skipped = Vec::new();

        for host_id in host_ids {
            match fetch_with_timeout(timeout, "host", host_id, self.inventory.host(host_id)).await
            {
                Ok(host) => hosts.push(host),
                Err(e) => {
                    warn!(
                        cluster_id = %cluster_id,
                        host_id = %host_id,
                        error = %e,
                        "Skipping host"
                    );
                    skipped.push(host_id.clone());
                }
            }
        }

        (hosts, skipped)
    }

    async fn fetch_vdis(&self, cluster_id: &str, hosts: &[&Host]) -> Vec<Vdi> {
        let timeout = self.config.fetch_timeout();
        let mut vdis = Vec::new();

        for host in hosts {
            match fetch_with_timeout(
                timeout,
                "host vdis",
                &host.name,
                self.inventory.vdis_on_host(&host.name),
            )
            .await
            {
                Ok(found) => {
                    debug!(host = %host.name, vdis = found.len(), "Fetched host VMs");
                    vdis.extend(found.into_iter().filter(|v| v.is_active()));
                }
                Err(e) => warn!(
                    cluster_id = %cluster_id,
                    host = %host.name,
                    error = %e,
                    "Skipping VM allocations of host"
                ),
            }
        }

        vdis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UtilizationTarget;
    use crate::store::InMemoryStore;
    use crate::testing::{cluster, host, vdi, FlakyInventory};

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_cluster(cluster("c1", "org-1")).await;
        for i in 1..=5 {
            store
                .upsert_host(host(&format!("h{}", i), "c1", 20, 102_400))
                .await;
        }
        store.upsert_vdi(vdi("v1", "h1", 4, 8_192, 100)).await;
        store.upsert_vdi(vdi("v2", "h2", 8, 16_384, 200)).await;
        store
    }

    fn aggregator(inventory: Arc<dyn InventorySource>, store: Arc<InMemoryStore>) -> CapacityAggregator {
        CapacityAggregator::new(inventory, store, Arc::new(EngineConfig::default()))
    }

    #[tokio::test]
    async fn test_recalculate_persists_snapshot() {
        let store = seeded_store().await;
        let agg = aggregator(store.clone(), store.clone());

        let snapshot = agg.recalculate("c1").await.unwrap();
        assert_eq!(snapshot.status, SnapshotStatus::Updated);
        assert_eq!(snapshot.host_count, 5);
        assert_eq!(snapshot.capacity.total.cpu_cores, 100);
        assert_eq!(snapshot.capacity.allocated.cpu_cores, 12);
        // floor(100 * 0.85) - 12
        assert_eq!(snapshot.capacity.available.cpu_cores, 73);

        let persisted = store.cluster("c1").await.unwrap();
        assert_eq!(persisted.capacity, snapshot.capacity);
        assert_eq!(persisted.host_count, 5);
        assert!(persisted.last_sync.is_some());
    }

    #[tokio::test]
    async fn test_recalculate_is_deterministic() {
        let store = seeded_store().await;
        let agg = aggregator(store.clone(), store.clone());

        let first = agg.recalculate("c1").await.unwrap();
        let second = agg.recalculate("c1").await.unwrap();
        assert_eq!(first.capacity, second.capacity);
    }

    #[tokio::test]
    async fn test_maintenance_host_excluded() {
        let store = seeded_store().await;
        let agg = aggregator(store.clone(), store.clone());

        let mut h5 = store.host("h5").await.unwrap();
        h5.maintenance_mode = true;
        store.upsert_host(h5.clone()).await;
        let snapshot = agg.recalculate("c1").await.unwrap();
        assert_eq!(snapshot.capacity.total.cpu_cores, 80);
        assert_eq!(snapshot.host_count, 4);

        h5.maintenance_mode = false;
        store.upsert_host(h5).await;
        let snapshot = agg.recalculate("c1").await.unwrap();
        assert_eq!(snapshot.capacity.total.cpu_cores, 100);
    }

    #[tokio::test]
    async fn test_vms_on_ineligible_hosts_not_allocated() {
        let store = seeded_store().await;
        let agg = aggregator(store.clone(), store.clone());

        let mut h2 = store.host("h2").await.unwrap();
        h2.connection_state = crate::models::ConnectionState::Disconnected;
        store.upsert_host(h2).await;

        let snapshot = agg.recalculate("c1").await.unwrap();
        assert_eq!(snapshot.capacity.allocated.cpu_cores, 4);
    }

    #[tokio::test]
    async fn test_no_eligible_hosts_keeps_prior_capacity() {
        let store = seeded_store().await;
        let agg = aggregator(store.clone(), store.clone());
        let before = agg.recalculate("c1").await.unwrap();

        for i in 1..=5 {
            let mut h = store.host(&format!("h{}", i)).await.unwrap();
            h.power_state = crate::models::PowerState::PoweredOff;
            store.upsert_host(h).await;
        }

        let after = agg.recalculate("c1").await.unwrap();
        assert_eq!(after.status, SnapshotStatus::NoEligibleHosts);
        assert_eq!(after.capacity, before.capacity);
        assert_eq!(store.cluster("c1").await.unwrap().capacity, before.capacity);
    }

    #[tokio::test]
    async fn test_failed_host_fetch_is_skipped() {
        let store = seeded_store().await;
        let flaky = Arc::new(FlakyInventory::new(store.clone()).fail_host("h3"));
        let agg = aggregator(flaky, store.clone());

        let snapshot = agg.recalculate("c1").await.unwrap();
        assert_eq!(snapshot.status, SnapshotStatus::Updated);
        assert_eq!(snapshot.host_count, 4);
        assert_eq!(snapshot.capacity.total.cpu_cores, 80);
        assert_eq!(snapshot.skipped_hosts, vec!["h3".to_string()]);
    }

    #[tokio::test]
    async fn test_slow_host_fetch_times_out_and_is_skipped() {
        let store = seeded_store().await;
        let flaky = Arc::new(FlakyInventory::new(store.clone()).stall_host("h1"));
        let config = EngineConfig {
            fetch_timeout_ms: 20,
            ..Default::default()
        };
        let agg = CapacityAggregator::new(flaky, store.clone(), Arc::new(config));

        let snapshot = agg.recalculate("c1").await.unwrap();
        assert_eq!(snapshot.host_count, 4);
        assert_eq!(snapshot.skipped_hosts, vec!["h1".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_cluster() {
        let store = seeded_store().await;
        let agg = aggregator(store.clone(), store.clone());
        assert!(matches!(
            agg.recalculate("missing").await,
            Err(EngineError::NotFound { kind: "cluster", .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_target_rejected_before_write() {
        let store = seeded_store().await;
        let mut c1 = store.cluster("c1").await.unwrap();
        c1.configuration.utilization_target = UtilizationTarget {
            cpu: 99.0,
            ..Default::default()
        };
        store.upsert_cluster(c1).await;

        let agg = aggregator(store.clone(), store.clone());
        assert!(matches!(
            agg.recalculate("c1").await,
            Err(EngineError::Validation(_))
        ));
        assert!(store.cluster("c1").await.unwrap().last_sync.is_none());
    }
}
