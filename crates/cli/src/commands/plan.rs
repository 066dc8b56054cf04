//! Full planning cycle for one cluster

use anyhow::Result;
use planner_lib::orchestrator::{CycleReport, ProfileSummary};
use planner_lib::{CycleOptions, CycleOutcome};
use tabled::Tabled;

use crate::commands::sizing::print_bulk;
use crate::engine::Engine;
use crate::output::{
    color_status, format_mb, format_percent, label, print_info, print_json, print_rows,
    print_success, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct SlotRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Specs")]
    specs: String,
    #[tabled(rename = "Current")]
    current: u32,
    #[tabled(rename = "Max")]
    maximum: u32,
    #[tabled(rename = "Slots")]
    slots: u32,
    #[tabled(rename = "Efficiency")]
    efficiency: String,
}

fn slot_row(profile: &ProfileSummary) -> SlotRow {
    SlotRow {
        name: profile.name.clone(),
        specs: format!(
            "{} vCPU / {} / {} GB",
            profile.resource_specs.cpu_cores,
            format_mb(profile.resource_specs.memory_mb),
            profile.resource_specs.storage_gb
        ),
        current: profile.allocation.current,
        maximum: profile.allocation.maximum,
        slots: profile.available_slots,
        efficiency: format_percent(profile.efficiency),
    }
}

fn print_report(report: &CycleReport) {
    let capacity = &report.capacity.capacity;
    print_success(&format!(
        "Planned cluster {} in {} ms",
        report.cluster_id,
        (report.finished_at - report.started_at).num_milliseconds()
    ));
    print_info(&format!(
        "Capacity {}: {} cores and {} available across {} host(s)",
        color_status(&label(&report.capacity.status)),
        capacity.available.cpu_cores,
        format_mb(capacity.available.memory_mb),
        report.capacity.host_count,
    ));

    let rows: Vec<SlotRow> = report
        .profiles
        .iter()
        .filter(|p| p.is_active)
        .map(|p| slot_row(&ProfileSummary::from(p)))
        .collect();
    print_rows(rows, "No active profiles");

    for recommendation in &report.recommendations {
        print_warning(&format!(
            "[{}] {}",
            label(&recommendation.action),
            recommendation.message
        ));
    }

    if let Some(sizing) = &report.sizing {
        println!();
        print_bulk(sizing);
    }
}

/// Aggregate, reconcile profiles and optionally right-size the cluster's VMs
pub async fn run(
    engine: &Engine,
    cluster_id: &str,
    options: CycleOptions,
    format: OutputFormat,
) -> Result<()> {
    let outcome = engine.orchestrator().run_cycle(cluster_id, options).await?;

    match format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Table => match &outcome {
            CycleOutcome::Completed(report) => print_report(report),
            CycleOutcome::Skipped { cluster_id } => {
                print_warning(&format!("A cycle for {} is already running", cluster_id))
            }
        },
    }
    Ok(())
}
