//! Persistence ports
//!
//! The engine talks to inventory, metrics and its own derived records only
//! through these traits. Each call is an I/O suspension point and is run
//! under a per-fetch timeout by the callers.

mod memory;

pub use memory::{InMemoryStore, InventorySnapshot};

use crate::error::{EngineError, Result};
use crate::models::{AllocationProfile, Cluster, Host, UtilizationSample, Vdi};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub use async_trait::async_trait;

/// Hosts and VMs pulled from hypervisor connectors
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Ids of every host registered to the cluster
    async fn host_ids(&self, cluster_id: &str) -> Result<Vec<String>>;

    async fn host(&self, host_id: &str) -> Result<Host>;

    /// VMs placed on the named host, in any status
    async fn vdis_on_host(&self, host_name: &str) -> Result<Vec<Vdi>>;

    async fn vdis_for_organization(&self, organization_id: &str) -> Result<Vec<Vdi>>;

    async fn vdi(&self, vdi_id: &str) -> Result<Vdi>;
}

/// Utilization time series per VM
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Samples within `[start, end]`, ordered by timestamp
    async fn samples(
        &self,
        vdi_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UtilizationSample>>;
}

/// Cluster and profile records owned by the engine.
///
/// Saves replace the whole record in one write.
#[async_trait]
pub trait PlanningStore: Send + Sync {
    async fn cluster(&self, cluster_id: &str) -> Result<Cluster>;

    async fn clusters_for_organization(&self, organization_id: &str) -> Result<Vec<Cluster>>;

    async fn active_clusters(&self) -> Result<Vec<Cluster>>;

    async fn save_cluster(&self, cluster: Cluster) -> Result<()>;

    async fn profiles_for_cluster(&self, cluster_id: &str) -> Result<Vec<AllocationProfile>>;

    async fn profile(&self, profile_id: &str) -> Result<AllocationProfile>;

    async fn save_profile(&self, profile: AllocationProfile) -> Result<()>;

    async fn delete_profile(&self, profile_id: &str) -> Result<()>;
}

/// Run a fetch under a timeout, mapping expiry to `FetchTimeout`
pub async fn fetch_with_timeout<T, F>(
    timeout: Duration,
    what: &'static str,
    id: &str,
    fetch: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::FetchTimeout {
            what,
            id: id.to_string(),
        }),
    }
}

/// Every VM placed on any host registered to the cluster.
///
/// Hosts whose fetch fails are skipped and logged; their ids are returned
/// alongside the VMs that did arrive.
pub async fn collect_cluster_vdis(
    inventory: &dyn InventorySource,
    cluster_id: &str,
    timeout: Duration,
) -> Result<(Vec<Vdi>, Vec<String>)> {
    let host_ids =
        fetch_with_timeout(timeout, "host list", cluster_id, inventory.host_ids(cluster_id)).await?;

    let mut vdis = Vec::new();
    let mut skipped = Vec::new();
    for host_id in &host_ids {
        let fetched = async {
            let host = fetch_with_timeout(timeout, "host", host_id, inventory.host(host_id)).await?;
            fetch_with_timeout(timeout, "host vdis", &host.name, inventory.vdis_on_host(&host.name))
                .await
        }
        .await;
        match fetched {
            Ok(found) => vdis.extend(found),
            Err(e) => {
                warn!(cluster_id = %cluster_id, host_id = %host_id, error = %e, "Skipping host VMs");
                skipped.push(host_id.clone());
            }
        }
    }
    Ok((vdis, skipped))
}
