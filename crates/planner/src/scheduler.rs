//! Periodic planning loop
//!
//! Plans every active cluster on a fixed interval and optionally writes the
//! derived state back to the inventory snapshot.

use planner_lib::{CycleOptions, CycleOutcome, InMemoryStore, PlanningOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Counts from one planning round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct PlanningLoop {
    orchestrator: Arc<PlanningOrchestrator>,
    store: Arc<InMemoryStore>,
    options: CycleOptions,
    interval: Duration,
    write_back: Option<PathBuf>,
}

impl PlanningLoop {
    pub fn new(
        orchestrator: Arc<PlanningOrchestrator>,
        store: Arc<InMemoryStore>,
        options: CycleOptions,
        interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            store,
            options,
            interval,
            write_back: None,
        }
    }

    /// Save the store to `path` after every round
    pub fn with_write_back(mut self, path: PathBuf) -> Self {
        self.write_back = Some(path);
        self
    }

    /// Run until a shutdown signal arrives. The first round starts immediately.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            analyze_sizing = self.options.analyze_sizing,
            "Starting planning loop"
        );

        let mut ticker = interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_round().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down planning loop");
                    break;
                }
            }
        }
    }

    pub async fn run_round(&self) -> RoundSummary {
        let start = Instant::now();
        let mut summary = RoundSummary::default();

        let results = match self.orchestrator.plan_all(self.options).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "Failed to list active clusters");
                return summary;
            }
        };

        for (cluster_id, outcome) in &results {
            match outcome {
                Ok(CycleOutcome::Completed(report)) => {
                    summary.completed += 1;
                    debug!(
                        cluster_id = %cluster_id,
                        profiles = report.profiles.len(),
                        recommendations = report.recommendations.len(),
                        "Cluster planned"
                    );
                }
                Ok(CycleOutcome::Skipped { .. }) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(cluster_id = %cluster_id, error = %e, "Cluster planning failed");
                }
            }
        }

        if let Some(path) = &self.write_back {
            if let Err(e) = self.store.save(path).await {
                warn!(path = %path.display(), error = %e, "Failed to write back snapshot");
            }
        }

        info!(
            clusters = results.len(),
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Planning round finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planner_lib::{EngineConfig, InventorySnapshot};
    use serde_json::json;
    use tempfile::tempdir;

    fn snapshot() -> InventorySnapshot {
        serde_json::from_value(json!({
            "clusters": [
                { "id": "c1", "name": "east", "organization_id": "org-1" },
                { "id": "c2", "name": "west", "organization_id": "org-1" }
            ],
            "hosts": [
                {
                    "id": "h1", "name": "esx-01", "cluster_id": "c1",
                    "capacity": {
                        "cpu_cores": 16, "cpu_mhz": 32000, "memory_mb": 65536,
                        "datastores": [{ "name": "ds1", "capacity_bytes": 1099511627776u64 }]
                    },
                    "connection_state": "connected",
                    "power_state": "powered_on"
                }
            ],
            "vdis": [
                {
                    "id": "v1", "name": "desktop-1", "organization_id": "org-1",
                    "esxi_host": "esx-01", "status": "active",
                    "resource_allocation": {
                        "cpu": { "cores": 2 },
                        "memory": { "allocated_mb": 4096 },
                        "storage": { "allocated_kb": 52428800u64 }
                    }
                }
            ]
        }))
        .unwrap()
    }

    fn planning_loop(store: Arc<InMemoryStore>) -> PlanningLoop {
        let orchestrator = PlanningOrchestrator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            EngineConfig::default(),
        )
        .unwrap();
        PlanningLoop::new(
            Arc::new(orchestrator),
            store,
            CycleOptions::default(),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_round_plans_every_active_cluster() {
        let store = Arc::new(InMemoryStore::from_snapshot(snapshot()));
        let summary = planning_loop(store).run_round().await;
        // c2 has no hosts; its cycle completes with zero capacity
        assert_eq!(
            summary,
            RoundSummary {
                completed: 2,
                skipped: 0,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_round_writes_back_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        let store = Arc::new(InMemoryStore::from_snapshot(snapshot()));

        planning_loop(store)
            .with_write_back(path.clone())
            .run_round()
            .await;

        let reloaded = InMemoryStore::load(&path).await.unwrap().snapshot().await;
        let east = reloaded.clusters.iter().find(|c| c.id == "c1").unwrap();
        assert_eq!(east.capacity.total.cpu_cores, 16);
        assert_eq!(east.host_count, 1);
        assert!(east.last_sync.is_some());
        assert_eq!(reloaded.vdis.len(), 1);
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown() {
        let store = Arc::new(InMemoryStore::from_snapshot(snapshot()));
        let planning = Arc::new(planning_loop(store));
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(planning.run(rx));
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
