//! Planning orchestrator
//!
//! Drives one cluster through aggregation, profile reconciliation and
//! optional bulk sizing. Each step reads the previous step's persisted
//! output, so the steps run strictly in order. Different clusters are
//! planned independently and a failure in one never reaches another.

mod guard;
mod status;

pub use guard::{CycleGuard, CyclePhase, InProgressSet};
pub use status::{ClusterStatus, CycleOptions, CycleOutcome, CycleReport, ProfileSummary};

use crate::capacity::{
    capacity_recommendations, CapacityAggregator, CapacityRecommendation,
    ClusterCapacitySnapshot, SnapshotStatus,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::health::HealthRegistry;
use crate::models::{AllocationProfile, Cluster, Vdi};
use crate::observability::{PlannerMetrics, StructuredLogger};
use crate::profiles::{NewProfile, ProfileManager};
use crate::sizing::{BulkSummary, SizingAnalyzer, SizingOutcome};
use crate::store::{
    collect_cluster_vdis, fetch_with_timeout, InventorySource, MetricsSource, PlanningStore,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub struct PlanningOrchestrator {
    inventory: Arc<dyn InventorySource>,
    store: Arc<dyn PlanningStore>,
    config: Arc<EngineConfig>,
    aggregator: CapacityAggregator,
    profiles: ProfileManager,
    sizing: SizingAnalyzer,
    in_progress: InProgressSet,
    metrics: PlannerMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl PlanningOrchestrator {
    /// Build an orchestrator over the given ports. Fails on invalid config.
    pub fn new(
        inventory: Arc<dyn InventorySource>,
        metrics: Arc<dyn MetricsSource>,
        store: Arc<dyn PlanningStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        Ok(Self {
            aggregator: CapacityAggregator::new(inventory.clone(), store.clone(), config.clone()),
            profiles: ProfileManager::new(
                inventory.clone(),
                metrics.clone(),
                store.clone(),
                config.clone(),
            ),
            sizing: SizingAnalyzer::new(inventory.clone(), metrics, config.clone()),
            inventory,
            store,
            config,
            in_progress: InProgressSet::new(),
            metrics: PlannerMetrics::new(),
            logger: StructuredLogger::new("capacity-planner"),
            health: None,
        })
    }

    /// Report per-cluster cycle outcomes into a health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current phase of a cluster's run, `Idle` when none is in flight
    pub fn phase(&self, cluster_id: &str) -> CyclePhase {
        self.in_progress.phase(cluster_id)
    }

    /// Run one full planning cycle for a cluster.
    ///
    /// Returns `Skipped` when a run for the same cluster is already in
    /// flight; the request is dropped rather than queued.
    pub async fn run_cycle(&self, cluster_id: &str, options: CycleOptions) -> Result<CycleOutcome> {
        let hours = self.config.lookback_hours(options.hours)?;

        let Some(guard) = self.in_progress.try_acquire(cluster_id, CyclePhase::Aggregating) else {
            self.metrics.inc_skipped_cycles();
            self.logger.log_cycle_skipped(cluster_id);
            return Ok(CycleOutcome::Skipped {
                cluster_id: cluster_id.to_string(),
            });
        };

        let started = Instant::now();
        let result = self
            .execute_cycle(&guard, cluster_id, options.analyze_sizing, hours)
            .await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(report) => {
                self.metrics.observe_cycle("completed", elapsed);
                info!(
                    cluster_id = %cluster_id,
                    profiles = report.profiles.len(),
                    recommendations = report.recommendations.len(),
                    duration_secs = elapsed,
                    "Planning cycle completed"
                );
            }
            Err(e) => {
                self.metrics.observe_cycle("failed", elapsed);
                if matches!(e, EngineError::FetchTimeout { .. }) {
                    self.metrics.inc_fetch_timeouts();
                }
                self.logger
                    .log_cycle_failed(cluster_id, guard.phase().as_str(), &e.to_string());
            }
        }

        result.map(CycleOutcome::Completed)
    }

    async fn execute_cycle(
        &self,
        guard: &CycleGuard,
        cluster_id: &str,
        analyze_sizing: bool,
        hours: u32,
    ) -> Result<CycleReport> {
        let started_at = Utc::now();

        let capacity = self.aggregator.recalculate(cluster_id).await?;
        self.record_capacity(&capacity);

        guard.advance(CyclePhase::ProfileReconciling);
        let reconciled = self.profiles.generate_auto_profiles(cluster_id).await?;
        let profiles = self.profiles.refresh_allocations(cluster_id).await?;
        let instances: u32 = reconciled.iter().map(|p| p.allocation.current).sum();
        self.logger
            .log_profiles_reconciled(cluster_id, reconciled.len(), instances);

        let cluster = self.cluster(cluster_id).await?;
        let recommendations = capacity_recommendations(&cluster, &profiles, &self.config.advisor);

        let sizing = if analyze_sizing {
            guard.advance(CyclePhase::Analyzing);
            Some(self.analyze_cluster_vms(cluster_id, hours).await?)
        } else {
            None
        };

        Ok(CycleReport {
            cluster_id: cluster_id.to_string(),
            capacity,
            profiles,
            recommendations,
            sizing,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn analyze_cluster_vms(&self, cluster_id: &str, hours: u32) -> Result<BulkSummary> {
        let (vdis, _) =
            collect_cluster_vdis(self.inventory.as_ref(), cluster_id, self.config.fetch_timeout())
                .await?;
        let active: Vec<Vdi> = vdis.into_iter().filter(|v| v.is_active()).collect();

        let started = Instant::now();
        let summary = self.sizing.analyze_vdis(active, hours).await;
        self.record_bulk(cluster_id, &summary, started);
        Ok(summary)
    }

    /// Plan every active cluster concurrently.
    ///
    /// Results come back sorted by cluster id, one entry per cluster, each
    /// with its own success or failure.
    pub async fn plan_all(
        self: &Arc<Self>,
        options: CycleOptions,
    ) -> Result<Vec<(String, Result<CycleOutcome>)>> {
        let clusters = fetch_with_timeout(
            self.config.fetch_timeout(),
            "active clusters",
            "*",
            self.store.active_clusters(),
        )
        .await?;
        let mut tasks = JoinSet::new();

        for cluster in clusters {
            let orchestrator = Arc::clone(self);
            tasks.spawn(async move {
                let outcome = orchestrator.run_cycle(&cluster.id, options).await;
                (cluster.id, outcome)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((cluster_id, outcome)) => {
                    if let Some(health) = &self.health {
                        let failure = outcome.as_ref().err().map(|e| e.to_string());
                        health.record_cycle(&cluster_id, failure.as_deref()).await;
                    }
                    results.push((cluster_id, outcome));
                }
                Err(e) => warn!(error = %e, "Planning task aborted"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        debug!(clusters = results.len(), failed = failed, "Planning round finished");
        Ok(results)
    }

    /// Recalculate capacity and refresh profile maxima outside a full cycle.
    ///
    /// Shares the per-cluster guard with [`Self::run_cycle`].
    pub async fn recalculate_capacity(&self, cluster_id: &str) -> Result<ClusterCapacitySnapshot> {
        let guard = self.acquire(cluster_id, CyclePhase::Aggregating)?;

        let snapshot = self.aggregator.recalculate(cluster_id).await?;
        self.record_capacity(&snapshot);

        guard.advance(CyclePhase::ProfileReconciling);
        self.profiles.refresh_allocations(cluster_id).await?;
        Ok(snapshot)
    }

    /// Discover and reconcile auto-generated profiles for a cluster
    pub async fn generate_auto_profiles(&self, cluster_id: &str) -> Result<Vec<AllocationProfile>> {
        let _guard = self.acquire(cluster_id, CyclePhase::ProfileReconciling)?;
        let profiles = self.profiles.generate_auto_profiles(cluster_id).await?;
        let instances: u32 = profiles.iter().map(|p| p.allocation.current).sum();
        self.logger
            .log_profiles_reconciled(cluster_id, profiles.len(), instances);
        Ok(profiles)
    }

    pub async fn create_profile(&self, request: NewProfile) -> Result<AllocationProfile> {
        let profile = self.profiles.create_profile(request).await?;
        self.logger
            .log_profile_created(&profile.cluster_id, &profile.id, &profile.name);
        Ok(profile)
    }

    pub async fn delete_profile(&self, profile_id: &str) -> Result<()> {
        self.profiles.delete_profile(profile_id).await
    }

    pub async fn list_profiles(&self, cluster_id: &str) -> Result<Vec<AllocationProfile>> {
        self.profiles.list_profiles(cluster_id).await
    }

    /// Capacity overview of every active cluster in an organization
    pub async fn capacity_status(&self, organization_id: &str) -> Result<Vec<ClusterStatus>> {
        let clusters = fetch_with_timeout(
            self.config.fetch_timeout(),
            "organization clusters",
            organization_id,
            self.store.clusters_for_organization(organization_id),
        )
        .await?;
        let mut statuses = Vec::with_capacity(clusters.len());
        for cluster in &clusters {
            let profiles = self.cluster_profiles(&cluster.id).await?;
            statuses.push(ClusterStatus::new(cluster, &profiles));
        }
        Ok(statuses)
    }

    pub async fn capacity_recommendations(
        &self,
        cluster_id: &str,
    ) -> Result<Vec<CapacityRecommendation>> {
        let cluster = self.cluster(cluster_id).await?;
        let profiles = self.cluster_profiles(cluster_id).await?;
        Ok(capacity_recommendations(&cluster, &profiles, &self.config.advisor))
    }

    pub async fn analyze_vm_sizing(&self, vdi_id: &str, hours: Option<u32>) -> Result<SizingOutcome> {
        let started = Instant::now();
        let outcome = self.sizing.analyze_vm(vdi_id, hours).await;
        self.metrics
            .observe_sizing_latency(started.elapsed().as_secs_f64());
        if outcome.is_ok() {
            self.metrics.add_vms_analyzed(1);
        }
        outcome
    }

    pub async fn analyze_bulk_vms(
        &self,
        organization_id: &str,
        hours: Option<u32>,
    ) -> Result<BulkSummary> {
        let started = Instant::now();
        let summary = self.sizing.analyze_bulk(organization_id, hours).await?;
        self.record_bulk(organization_id, &summary, started);
        Ok(summary)
    }

    async fn cluster(&self, cluster_id: &str) -> Result<Cluster> {
        fetch_with_timeout(
            self.config.fetch_timeout(),
            "cluster",
            cluster_id,
            self.store.cluster(cluster_id),
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

    fn acquire(&self, cluster_id: &str, phase: CyclePhase) -> Result<CycleGuard> {
        self.in_progress.try_acquire(cluster_id, phase).ok_or_else(|| {
            self.metrics.inc_skipped_cycles();
            self.logger.log_cycle_skipped(cluster_id);
            EngineError::ConcurrentRunSkipped(cluster_id.to_string())
        })
    }

    fn record_capacity(&self, snapshot: &ClusterCapacitySnapshot) {
        match snapshot.status {
            SnapshotStatus::Updated => {
                let available = &snapshot.capacity.available;
                self.metrics.set_available_capacity(
                    &snapshot.cluster_id,
                    available.cpu_cores,
                    available.memory_mb,
                    available.storage_gb,
                );
                self.logger.log_capacity_recalculated(
                    &snapshot.cluster_id,
                    snapshot.host_count,
                    snapshot.skipped_hosts.len(),
                    available.cpu_cores,
                    available.memory_mb,
                );
            }
            SnapshotStatus::NoEligibleHosts => self.logger.log_no_eligible_hosts(&snapshot.cluster_id),
        }
    }

    fn record_bulk(&self, scope: &str, summary: &BulkSummary, started: Instant) {
        self.metrics
            .observe_sizing_latency(started.elapsed().as_secs_f64());
        self.metrics.add_vms_analyzed(summary.counts.total as u64);
        self.logger.log_bulk_sizing(
            scope,
            summary.counts.total,
            summary.counts.oversized,
            summary.counts.undersized,
            summary.counts.error,
        );
    }
}
