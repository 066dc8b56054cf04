//! Cluster capacity commands

use anyhow::Result;
use planner_lib::capacity::{CapacityRecommendation, ClusterCapacitySnapshot, SnapshotStatus};
use planner_lib::orchestrator::ClusterStatus;
use planner_lib::ResourceCapacity;
use tabled::Tabled;

use crate::engine::Engine;
use crate::output::{
    color_status, color_utilization, format_gb, format_mb, label, print_info, print_json,
    print_rows, print_success, print_warning, OutputFormat,
};

/// Row for the capacity breakdown table
#[derive(Tabled)]
struct CapacityRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Total")]
    total: String,
    #[tabled(rename = "Allocated")]
    allocated: String,
    #[tabled(rename = "Available")]
    available: String,
}

/// Row for the organization overview
#[derive(Tabled)]
struct ClusterRow {
    #[tabled(rename = "Cluster")]
    name: String,
    #[tabled(rename = "Hosts")]
    hosts: u32,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Storage")]
    storage: String,
    #[tabled(rename = "Free Cores")]
    free_cores: u64,
    #[tabled(rename = "Free Memory")]
    free_memory: String,
    #[tabled(rename = "Profiles")]
    profiles: usize,
    #[tabled(rename = "Last Sync")]
    last_sync: String,
}

#[derive(Tabled)]
struct RecommendationRow {
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Message")]
    message: String,
}

fn capacity_rows(
    total: &ResourceCapacity,
    allocated: &ResourceCapacity,
    available: &ResourceCapacity,
) -> Vec<CapacityRow> {
    vec![
        CapacityRow {
            resource: "CPU cores".to_string(),
            total: total.cpu_cores.to_string(),
            allocated: allocated.cpu_cores.to_string(),
            available: available.cpu_cores.to_string(),
        },
        CapacityRow {
            resource: "CPU MHz".to_string(),
            total: total.cpu_mhz.to_string(),
            allocated: allocated.cpu_mhz.to_string(),
            available: available.cpu_mhz.to_string(),
        },
        CapacityRow {
            resource: "Memory".to_string(),
            total: format_mb(total.memory_mb),
            allocated: format_mb(allocated.memory_mb),
            available: format_mb(available.memory_mb),
        },
        CapacityRow {
            resource: "Storage".to_string(),
            total: format_gb(total.storage_gb),
            allocated: format_gb(allocated.storage_gb),
            available: format_gb(available.storage_gb),
        },
    ]
}

fn print_snapshot(snapshot: &ClusterCapacitySnapshot) {
    match snapshot.status {
        SnapshotStatus::Updated => print_success(&format!(
            "Cluster {} recalculated from {} host(s)",
            snapshot.cluster_id, snapshot.host_count
        )),
        SnapshotStatus::NoEligibleHosts => print_warning(&format!(
            "Cluster {} has no eligible hosts; showing last known capacity",
            snapshot.cluster_id
        )),
    }
    if !snapshot.skipped_hosts.is_empty() {
        print_warning(&format!(
            "Skipped hosts: {}",
            snapshot.skipped_hosts.join(", ")
        ));
    }

    let capacity = &snapshot.capacity;
    print_rows(
        capacity_rows(&capacity.total, &capacity.allocated, &capacity.available),
        "No capacity data",
    );
}

/// Recompute a cluster's capacity and refresh its profile maxima
pub async fn recalculate(engine: &Engine, cluster_id: &str, format: OutputFormat) -> Result<()> {
    let snapshot = engine.orchestrator().recalculate_capacity(cluster_id).await?;

    match format {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Table => print_snapshot(&snapshot),
    }
    Ok(())
}

fn cluster_row(status: &ClusterStatus) -> ClusterRow {
    ClusterRow {
        name: status.name.clone(),
        hosts: status.host_count,
        cpu: color_utilization(status.utilization.cpu.percentage),
        memory: color_utilization(status.utilization.memory.percentage),
        storage: color_utilization(status.utilization.storage.percentage),
        free_cores: status.capacity.available.cpu_cores,
        free_memory: format_mb(status.capacity.available.memory_mb),
        profiles: status.profiles.len(),
        last_sync: status
            .last_sync
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string()),
    }
}

/// Capacity overview of every active cluster in an organization
pub async fn status(engine: &Engine, organization_id: &str, format: OutputFormat) -> Result<()> {
    let clusters = engine.orchestrator().capacity_status(organization_id).await?;

    match format {
        OutputFormat::Json => print_json(&clusters)?,
        OutputFormat::Table => {
            print_rows(
                clusters.iter().map(cluster_row).collect(),
                "No active clusters found",
            );
            if !clusters.is_empty() {
                print_info(&format!("Total: {} clusters", clusters.len()));
            }
        }
    }
    Ok(())
}

fn recommendation_row(recommendation: &CapacityRecommendation) -> RecommendationRow {
    RecommendationRow {
        kind: color_status(&label(&recommendation.kind)),
        category: label(&recommendation.category),
        priority: color_status(&label(&recommendation.priority)),
        action: label(&recommendation.action),
        message: recommendation.message.clone(),
    }
}

pub async fn recommendations(engine: &Engine, cluster_id: &str, format: OutputFormat) -> Result<()> {
    let recommendations = engine
        .orchestrator()
        .capacity_recommendations(cluster_id)
        .await?;

    match format {
        OutputFormat::Json => print_json(&recommendations)?,
        OutputFormat::Table => {
            if recommendations.is_empty() {
                print_success(&format!("No capacity concerns for cluster {}", cluster_id));
                return Ok(());
            }
            print_rows(
                recommendations.iter().map(recommendation_row).collect(),
                "No recommendations",
            );
        }
    }
    Ok(())
}
