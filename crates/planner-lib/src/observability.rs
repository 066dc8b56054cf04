//! Metrics and structured event logging for planning runs

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Buckets for planning cycle durations (seconds)
const CYCLE_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Buckets for single-VM and bulk sizing latency (seconds)
const SIZING_BUCKETS: &[f64] = &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0];

static GLOBAL_METRICS: OnceLock<PlannerMetricsInner> = OnceLock::new();

struct PlannerMetricsInner {
    cycle_duration_seconds: Histogram,
    sizing_latency_seconds: Histogram,
    cycles_total: IntCounterVec,
    fetch_timeouts_total: IntCounter,
    vms_analyzed_total: IntCounter,
    available_capacity: GaugeVec,
}

impl PlannerMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "capacity_planner_cycle_duration_seconds",
                "Wall time of one cluster planning cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            sizing_latency_seconds: register_histogram!(
                "capacity_planner_sizing_latency_seconds",
                "Time spent in VM sizing analysis",
                SIZING_BUCKETS.to_vec()
            )
            .expect("Failed to register sizing_latency_seconds"),

            cycles_total: register_int_counter_vec!(
                "capacity_planner_cycles_total",
                "Planning cycles by outcome",
                &["outcome"]
            )
            .expect("Failed to register cycles_total"),

            fetch_timeouts_total: register_int_counter!(
                "capacity_planner_fetch_timeouts_total",
                "Inventory or metrics fetches that timed out"
            )
            .expect("Failed to register fetch_timeouts_total"),

            vms_analyzed_total: register_int_counter!(
                "capacity_planner_vms_analyzed_total",
                "VMs passed through sizing analysis"
            )
            .expect("Failed to register vms_analyzed_total"),

            available_capacity: register_gauge_vec!(
                "capacity_planner_available_capacity",
                "Available capacity per cluster under its utilization target",
                &["cluster", "resource"]
            )
            .expect("Failed to register available_capacity"),
        }
    }
}

/// Cheap handle to the process-wide planner metrics
#[derive(Clone)]
pub struct PlannerMetrics {
    _private: (),
}

impl Default for PlannerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PlannerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PlannerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PlannerMetricsInner {
        GLOBAL_METRICS.get_or_init(PlannerMetricsInner::new)
    }

    pub fn observe_cycle(&self, outcome: &str, duration_secs: f64) {
        let inner = self.inner();
        inner.cycle_duration_seconds.observe(duration_secs);
        inner.cycles_total.with_label_values(&[outcome]).inc();
    }

    pub fn inc_skipped_cycles(&self) {
        self.inner().cycles_total.with_label_values(&["skipped"]).inc();
    }

    pub fn observe_sizing_latency(&self, duration_secs: f64) {
        self.inner().sizing_latency_seconds.observe(duration_secs);
    }

    pub fn inc_fetch_timeouts(&self) {
        self.inner().fetch_timeouts_total.inc();
    }

    pub fn add_vms_analyzed(&self, count: u64) {
        self.inner().vms_analyzed_total.inc_by(count);
    }

    pub fn set_available_capacity(&self, cluster_id: &str, cores: u64, memory_mb: u64, storage_gb: f64) {
        let gauge = &self.inner().available_capacity;
        gauge.with_label_values(&[cluster_id, "cpu_cores"]).set(cores as f64);
        gauge.with_label_values(&[cluster_id, "memory_mb"]).set(memory_mb as f64);
        gauge.with_label_values(&[cluster_id, "storage_gb"]).set(storage_gb);
    }
}

/// Event-shaped log records for planning runs
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_capacity_recalculated(
        &self,
        cluster_id: &str,
        host_count: u32,
        skipped_hosts: usize,
        available_cores: u64,
        available_memory_mb: u64,
    ) {
        info!(
            event = "capacity_recalculated",
            instance = %self.instance,
            cluster_id = %cluster_id,
            host_count = host_count,
            skipped_hosts = skipped_hosts,
            available_cores = available_cores,
            available_memory_mb = available_memory_mb,
            "Cluster capacity recalculated"
        );
    }

    pub fn log_no_eligible_hosts(&self, cluster_id: &str) {
        warn!(
            event = "no_eligible_hosts",
            instance = %self.instance,
            cluster_id = %cluster_id,
            "No eligible hosts, previous capacity kept"
        );
    }

    pub fn log_profiles_reconciled(&self, cluster_id: &str, profiles: usize, instances: u32) {
        info!(
            event = "profiles_reconciled",
            instance = %self.instance,
            cluster_id = %cluster_id,
            profiles = profiles,
            instances = instances,
            "Allocation profiles reconciled"
        );
    }

    pub fn log_profile_created(&self, cluster_id: &str, profile_id: &str, name: &str) {
        info!(
            event = "profile_created",
            instance = %self.instance,
            cluster_id = %cluster_id,
            profile_id = %profile_id,
            name = %name,
            "Allocation profile created"
        );
    }

    pub fn log_cycle_skipped(&self, cluster_id: &str) {
        warn!(
            event = "cycle_skipped",
            instance = %self.instance,
            cluster_id = %cluster_id,
            "Planning cycle already running for cluster, request dropped"
        );
    }

    pub fn log_cycle_failed(&self, cluster_id: &str, phase: &str, reason: &str) {
        error!(
            event = "cycle_failed",
            instance = %self.instance,
            cluster_id = %cluster_id,
            phase = %phase,
            reason = %reason,
            "Planning cycle failed"
        );
    }

    pub fn log_bulk_sizing(&self, scope: &str, total: usize, oversized: usize, undersized: usize, errors: usize) {
        info!(
            event = "bulk_sizing_completed",
            instance = %self.instance,
            scope = %scope,
            total = total,
            oversized = oversized,
            undersized = undersized,
            errors = errors,
            "Bulk sizing analysis completed"
        );
    }

    pub fn log_startup(&self, version: &str, clusters: usize) {
        info!(
            event = "planner_started",
            instance = %self.instance,
            version = %version,
            clusters = clusters,
            "Capacity planner started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "planner_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Capacity planner shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handle_shares_registry() {
        let metrics = PlannerMetrics::new();
        let clone = metrics.clone();
        metrics.observe_cycle("completed", 0.2);
        clone.inc_skipped_cycles();
        clone.observe_sizing_latency(0.01);
        clone.add_vms_analyzed(3);
        metrics.set_available_capacity("c1", 10, 4_096, 120.5);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "capacity_planner_cycles_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("planner-1");
        assert_eq!(logger.instance, "planner-1");
    }
}
