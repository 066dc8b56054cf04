//! Bulk sizing across many VMs
//!
//! VMs are analyzed on a bounded worker pool. A failure for one VM lands in
//! its own slot of the summary and never aborts the batch.

use super::{ActionPriority, Classification, Confidence, SizingAnalyzer, SizingOutcome};
use crate::error::{EngineError, Result};
use crate::models::Vdi;
use crate::store::fetch_with_timeout;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkCounts {
    pub total: usize,
    pub optimal: usize,
    pub oversized: usize,
    pub undersized: usize,
    pub insufficient_data: usize,
    pub error: usize,
}

/// Savings summed over VMs whose overall label is oversized
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PotentialSavings {
    pub cpu_cores: i64,
    pub memory_gb: f64,
    pub estimated_monthly: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkRecommendation {
    pub vdi_id: String,
    pub vdi_name: String,
    pub recommendation: Classification,
    pub priority: ActionPriority,
    pub summary: String,
    /// Lower of the CPU and memory confidence
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    pub vdi_id: String,
    pub vdi_name: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkSummary {
    pub counts: BulkCounts,
    pub total_potential_savings: PotentialSavings,
    /// Top recommendations by action priority, then confidence
    pub recommendations: Vec<BulkRecommendation>,
    pub failures: Vec<BulkFailure>,
    pub analyzed_at: DateTime<Utc>,
}

impl SizingAnalyzer {
    /// Analyze every active VM of an organization
    pub async fn analyze_bulk(
        &self,
        organization_id: &str,
        hours: Option<u32>,
    ) -> Result<BulkSummary> {
        let hours = self.config.lookback_hours(hours)?;
        let vdis = fetch_with_timeout(
            self.config.fetch_timeout(),
            "organization vdis",
            organization_id,
            self.inventory.vdis_for_organization(organization_id),
        )
        .await?;
        let active: Vec<Vdi> = vdis.into_iter().filter(|v| v.is_active()).collect();

        let summary = self.analyze_vdis(active, hours).await;
        info!(
            organization_id = %organization_id,
            total = summary.counts.total,
            oversized = summary.counts.oversized,
            undersized = summary.counts.undersized,
            errors = summary.counts.error,
            "Bulk sizing analysis completed"
        );
        Ok(summary)
    }

    /// Analyze the given VMs concurrently, at most `bulk_concurrency` at a time
    pub async fn analyze_vdis(&self, vdis: Vec<Vdi>, hours: u32) -> BulkSummary {
        let permits = Arc::new(Semaphore::new(self.config.bulk_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        let names: Vec<(String, String)> =
            vdis.iter().map(|v| (v.id.clone(), v.name.clone())).collect();
        for (idx, vdi) in vdis.into_iter().enumerate() {
            let analyzer = self.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (idx, analyzer.analyze_vdi(&vdi, hours).await)
            });
        }

        let mut slots: Vec<Option<Result<SizingOutcome>>> = names.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(e) => warn!(error = %e, "Sizing task aborted"),
            }
        }

        let outcomes = names.into_iter().zip(slots).map(|((id, name), slot)| {
            let outcome = slot
                .unwrap_or_else(|| Err(EngineError::Source("sizing task aborted".to_string())));
            (id, name, outcome)
        });
        summarize(outcomes, self.config.bulk_top_n)
    }
}

fn summarize(
    outcomes: impl Iterator<Item = (String, String, Result<SizingOutcome>)>,
    top_n: usize,
) -> BulkSummary {
    let mut counts = BulkCounts::default();
    let mut savings = PotentialSavings::default();
    let mut recommendations = Vec::new();
    let mut failures = Vec::new();

    for (vdi_id, vdi_name, outcome) in outcomes {
        counts.total += 1;
        let report = match outcome {
            Ok(SizingOutcome::Analyzed(report)) => report,
            Ok(SizingOutcome::InsufficientData { .. }) => {
                counts.insufficient_data += 1;
                continue;
            }
            Err(e) => {
                warn!(vdi_id = %vdi_id, error = %e, "Sizing analysis failed");
                counts.error += 1;
                failures.push(BulkFailure {
                    vdi_id,
                    vdi_name,
                    message: e.to_string(),
                });
                continue;
            }
        };

        let overall = &report.overall;
        match overall.recommendation {
            Classification::Optimal => counts.optimal += 1,
            Classification::Undersized => counts.undersized += 1,
            Classification::Oversized => {
                counts.oversized += 1;
                if let Some(cpu) = report.cpu.potential_savings {
                    savings.cpu_cores += cpu.cores_saved;
                    savings.estimated_monthly += cpu.estimated_monthly_saving;
                }
                if let Some(memory) = report.memory.potential_savings {
                    savings.memory_gb += memory.gb_saved;
                    savings.estimated_monthly += memory.estimated_monthly_saving;
                }
            }
        }

        recommendations.push(BulkRecommendation {
            vdi_id,
            vdi_name,
            recommendation: overall.recommendation,
            priority: overall.action_priority,
            summary: overall.summary.clone(),
            confidence: report.cpu.confidence.min(report.memory.confidence),
        });
    }

    // stable: ties keep input order
    recommendations.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.confidence.cmp(&a.confidence))
    });
    recommendations.truncate(top_n);

    BulkSummary {
        counts,
        total_potential_savings: savings,
        recommendations,
        failures,
        analyzed_at: Utc::now(),
    }
}
