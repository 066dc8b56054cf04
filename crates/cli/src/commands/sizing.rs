//! VM right-sizing commands

use anyhow::Result;
use planner_lib::sizing::{BulkSummary, SizingOutcome, SizingReport};
use tabled::Tabled;

use crate::engine::Engine;
use crate::output::{
    color_status, format_currency, format_gb, format_mb, format_percent, label, print_info,
    print_json, print_rows, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Avg")]
    avg: String,
    #[tabled(rename = "P95")]
    p95: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Suggested")]
    suggested: String,
    #[tabled(rename = "Verdict")]
    verdict: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Monthly Saving")]
    saving: String,
}

#[derive(Tabled)]
struct BulkRow {
    #[tabled(rename = "VM")]
    vdi_name: String,
    #[tabled(rename = "Verdict")]
    verdict: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Summary")]
    summary: String,
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Total")]
    total: usize,
    #[tabled(rename = "Optimal")]
    optimal: usize,
    #[tabled(rename = "Oversized")]
    oversized: usize,
    #[tabled(rename = "Undersized")]
    undersized: usize,
    #[tabled(rename = "No Data")]
    insufficient_data: usize,
    #[tabled(rename = "Errors")]
    error: usize,
}

fn resource_rows(report: &SizingReport) -> Vec<ResourceRow> {
    let stats = &report.utilization_stats;
    vec![
        ResourceRow {
            resource: "CPU".to_string(),
            avg: format_percent(stats.cpu.avg),
            p95: format_percent(stats.cpu.p95),
            current: format!("{} cores", report.cpu.current_cores),
            suggested: format!("{} cores", report.cpu.suggested_cores),
            verdict: color_status(report.cpu.recommendation.as_str()),
            confidence: label(&report.cpu.confidence),
            saving: report
                .cpu
                .potential_savings
                .as_ref()
                .map(|s| format_currency(s.estimated_monthly_saving))
                .unwrap_or_else(|| "-".to_string()),
        },
        ResourceRow {
            resource: "Memory".to_string(),
            avg: format_percent(stats.memory.avg),
            p95: format_percent(stats.memory.p95),
            current: format_mb(report.memory.current_mb),
            suggested: format_mb(report.memory.suggested_mb),
            verdict: color_status(report.memory.recommendation.as_str()),
            confidence: label(&report.memory.confidence),
            saving: report
                .memory
                .potential_savings
                .as_ref()
                .map(|s| format_currency(s.estimated_monthly_saving))
                .unwrap_or_else(|| "-".to_string()),
        },
    ]
}

/// Right-size one VM from its utilization history
pub async fn analyze(
    engine: &Engine,
    vdi_id: &str,
    hours: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let outcome = engine.orchestrator().analyze_vm_sizing(vdi_id, hours).await?;

    if format == OutputFormat::Json {
        return print_json(&outcome);
    }

    match &outcome {
        SizingOutcome::InsufficientData {
            vdi_name, message, ..
        } => print_warning(&format!("{}: {}", vdi_name, message)),
        SizingOutcome::Analyzed(report) => {
            print_info(&format!(
                "{} ({} samples, {} to {})",
                report.vdi_name,
                report.data_points,
                report.time_range.start.format("%Y-%m-%d %H:%M"),
                report.time_range.end.format("%Y-%m-%d %H:%M"),
            ));
            print_rows(resource_rows(report), "No sizing data");
            println!(
                "\nOverall: {} (priority {})",
                color_status(report.overall.recommendation.as_str()),
                color_status(&label(&report.overall.action_priority)),
            );
            println!("{}", report.overall.summary);
        }
    }
    Ok(())
}

pub(crate) fn print_bulk(summary: &BulkSummary) {
    let counts = &summary.counts;
    print_rows(
        vec![CountRow {
            total: counts.total,
            optimal: counts.optimal,
            oversized: counts.oversized,
            undersized: counts.undersized,
            insufficient_data: counts.insufficient_data,
            error: counts.error,
        }],
        "No VMs analyzed",
    );

    let savings = &summary.total_potential_savings;
    print_info(&format!(
        "Potential savings: {} cores, {}, {} per month",
        savings.cpu_cores,
        format_gb(savings.memory_gb),
        format_currency(savings.estimated_monthly),
    ));

    let rows: Vec<BulkRow> = summary
        .recommendations
        .iter()
        .map(|r| BulkRow {
            vdi_name: r.vdi_name.clone(),
            verdict: color_status(r.recommendation.as_str()),
            priority: color_status(&label(&r.priority)),
            confidence: label(&r.confidence),
            summary: r.summary.clone(),
        })
        .collect();
    print_rows(rows, "No sizing recommendations");

    for failure in &summary.failures {
        print_warning(&format!("{}: {}", failure.vdi_name, failure.message));
    }
}

/// Right-size every active VM of an organization
pub async fn bulk(
    engine: &Engine,
    organization_id: &str,
    hours: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let summary = engine
        .orchestrator()
        .analyze_bulk_vms(organization_id, hours)
        .await?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => print_bulk(&summary),
    }
    Ok(())
}
