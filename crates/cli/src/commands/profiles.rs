//! Allocation profile commands

use anyhow::Result;
use planner_lib::profiles::NewProfile;
use planner_lib::{AllocationProfile, ResourceSpecs};
use tabled::Tabled;

use crate::engine::Engine;
use crate::output::{format_mb, format_percent, print_info, print_json, print_rows, print_success, OutputFormat};

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Cores")]
    cores: u32,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Storage")]
    storage: String,
    #[tabled(rename = "Current")]
    current: u32,
    #[tabled(rename = "Max")]
    maximum: u32,
    #[tabled(rename = "Slots")]
    slots: u32,
    #[tabled(rename = "Efficiency")]
    efficiency: String,
    #[tabled(rename = "Auto")]
    auto: String,
}

/// Shorten generated ids for table display
fn truncate_id(id: &str) -> String {
    if id.chars().count() > 8 {
        format!("{}...", id.chars().take(8).collect::<String>())
    } else {
        id.to_string()
    }
}

fn profile_row(profile: &AllocationProfile) -> ProfileRow {
    ProfileRow {
        id: truncate_id(&profile.id),
        name: profile.name.clone(),
        cores: profile.resource_specs.cpu_cores,
        memory: format_mb(profile.resource_specs.memory_mb),
        storage: format!("{} GB", profile.resource_specs.storage_gb),
        current: profile.allocation.current,
        maximum: profile.allocation.maximum,
        slots: profile.available_slots(),
        efficiency: format_percent(profile.utilization_stats.efficiency),
        auto: if profile.auto_generated { "yes" } else { "no" }.to_string(),
    }
}

fn print_profiles(profiles: &[AllocationProfile], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(profiles)?,
        OutputFormat::Table => {
            print_rows(profiles.iter().map(profile_row).collect(), "No profiles found");
            if !profiles.is_empty() {
                print_info(&format!("Total: {} profiles", profiles.len()));
            }
        }
    }
    Ok(())
}

/// Discover auto profiles from the cluster's VM population
pub async fn generate(engine: &Engine, cluster_id: &str, format: OutputFormat) -> Result<()> {
    let profiles = engine
        .orchestrator()
        .generate_auto_profiles(cluster_id)
        .await?;
    if format == OutputFormat::Table {
        print_success(&format!(
            "Reconciled {} auto profile(s) for cluster {}",
            profiles.len(),
            cluster_id
        ));
    }
    print_profiles(&profiles, format)
}

pub async fn list(engine: &Engine, cluster_id: &str, format: OutputFormat) -> Result<()> {
    let profiles = engine.orchestrator().list_profiles(cluster_id).await?;
    print_profiles(&profiles, format)
}

pub struct CreateArgs {
    pub cluster_id: String,
    pub name: String,
    pub cores: u32,
    pub mhz: Option<u64>,
    pub memory_mb: u64,
    pub storage_gb: u64,
    pub tags: Vec<String>,
}

pub async fn create(engine: &Engine, args: CreateArgs, format: OutputFormat) -> Result<()> {
    let mhz = args
        .mhz
        .unwrap_or(args.cores as u64 * engine.orchestrator().config().default_mhz_per_core);
    let profile = engine
        .orchestrator()
        .create_profile(NewProfile {
            name: args.name,
            cluster_id: args.cluster_id,
            resource_specs: ResourceSpecs {
                cpu_cores: args.cores,
                cpu_mhz: mhz,
                memory_mb: args.memory_mb,
                storage_gb: args.storage_gb,
            },
            tags: args.tags,
        })
        .await?;

    match format {
        OutputFormat::Json => print_json(&profile)?,
        OutputFormat::Table => {
            print_success(&format!("Created profile {} ({})", profile.name, profile.id));
            print_rows(vec![profile_row(&profile)], "No profiles found");
        }
    }
    Ok(())
}

pub async fn delete(engine: &Engine, profile_id: &str, format: OutputFormat) -> Result<()> {
    engine.orchestrator().delete_profile(profile_id).await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "deleted": profile_id }))?,
        OutputFormat::Table => print_success(&format!("Deleted profile {}", profile_id)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_id() {
        assert_eq!(truncate_id("0f9a2c7e-1111-2222"), "0f9a2c7e...");
        assert_eq!(truncate_id("p-1"), "p-1");
    }
}
