//! Per-VM sizing analysis against the metrics source

use super::{
    analyze_cpu, analyze_memory, overall_recommendation, SizingOutcome, SizingReport, TimeRange,
    UtilizationStats,
};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{UtilizationSample, Vdi};
use crate::stats::SampleStats;
use crate::store::{fetch_with_timeout, InventorySource, MetricsSource};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct SizingAnalyzer {
    pub(super) inventory: Arc<dyn InventorySource>,
    metrics: Arc<dyn MetricsSource>,
    pub(super) config: Arc<EngineConfig>,
}

impl SizingAnalyzer {
    pub fn new(
        inventory: Arc<dyn InventorySource>,
        metrics: Arc<dyn MetricsSource>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            inventory,
            metrics,
            config,
        }
    }

    /// Analyze one VM over the trailing `hours` (default lookback when `None`)
    pub async fn analyze_vm(&self, vdi_id: &str, hours: Option<u32>) -> Result<SizingOutcome> {
        let hours = self.config.lookback_hours(hours)?;
        let vdi = fetch_with_timeout(
            self.config.fetch_timeout(),
            "vdi",
            vdi_id,
            self.inventory.vdi(vdi_id),
        )
        .await?;
        self.analyze_vdi(&vdi, hours).await
    }

    pub(super) async fn analyze_vdi(&self, vdi: &Vdi, hours: u32) -> Result<SizingOutcome> {
        let end = Utc::now();
        let start = end - Duration::hours(hours as i64);
        let time_range = TimeRange { start, end };

        let samples = fetch_with_timeout(
            self.config.fetch_timeout(),
            "samples",
            &vdi.id,
            self.metrics.samples(&vdi.id, start, end),
        )
        .await?;

        if samples.is_empty() {
            warn!(vdi_id = %vdi.id, hours = hours, "No utilization samples in window");
            return Ok(SizingOutcome::InsufficientData {
                vdi_id: vdi.id.clone(),
                vdi_name: vdi.name.clone(),
                current_specs: vdi.resource_allocation.clone(),
                message: "Not enough performance data available for analysis".to_string(),
                data_points: 0,
                time_range,
            });
        }

        let report = self.build_report(vdi, &samples, time_range);
        debug!(
            vdi_id = %vdi.id,
            data_points = report.data_points,
            recommendation = report.overall.recommendation.as_str(),
            "VM sizing analyzed"
        );
        Ok(SizingOutcome::Analyzed(report))
    }

    fn build_report(
        &self,
        vdi: &Vdi,
        samples: &[UtilizationSample],
        time_range: TimeRange,
    ) -> SizingReport {
        let cpu_values: Vec<f64> = samples.iter().map(|s| s.cpu_percent).collect();
        let memory_values: Vec<f64> = samples.iter().map(|s| s.memory_percent).collect();
        let utilization_stats = UtilizationStats {
            cpu: SampleStats::from_values(&cpu_values),
            memory: SampleStats::from_values(&memory_values),
        };

        let thresholds = &self.config.sizing;
        let rates = &self.config.cost_rates;
        let alloc = &vdi.resource_allocation;
        let cpu = analyze_cpu(alloc.cpu.cores, &utilization_stats.cpu, &thresholds.cpu, rates);
        let memory = analyze_memory(
            alloc.memory.allocated_mb,
            &utilization_stats.memory,
            &thresholds.memory,
            thresholds.memory_step_mb,
            rates,
        );
        let overall = overall_recommendation(&cpu, &memory);

        SizingReport {
            vdi_id: vdi.id.clone(),
            vdi_name: vdi.name.clone(),
            current_specs: alloc.clone(),
            cpu,
            memory,
            overall,
            utilization_stats,
            data_points: samples.len(),
            time_range,
            analyzed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::sizing::{ActionPriority, Classification, Concern};
    use crate::store::InMemoryStore;
    use crate::testing::{sample_at, vdi};

    fn analyzer(store: &Arc<InMemoryStore>) -> SizingAnalyzer {
        SizingAnalyzer::new(store.clone(), store.clone(), Arc::new(EngineConfig::default()))
    }

    async fn record_series(store: &InMemoryStore, vdi_id: &str, readings: &[(f64, f64)]) {
        let now = Utc::now();
        for (i, (cpu, memory)) in readings.iter().enumerate() {
            store
                .record_sample(sample_at(
                    vdi_id,
                    now - Duration::minutes(5 * (i as i64 + 1)),
                    *cpu,
                    *memory,
                ))
                .await;
        }
    }

    #[tokio::test]
    async fn test_oversized_vm_report() {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_vdi(vdi("v1", "h1", 8, 16_384, 100)).await;
        let readings: Vec<(f64, f64)> = (0..19).map(|_| (10.0, 50.0)).chain([(40.0, 60.0)]).collect();
        record_series(&store, "v1", &readings).await;

        let outcome = analyzer(&store).analyze_vm("v1", None).await.unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.data_points, 20);
        assert_eq!(report.cpu.recommendation, Classification::Oversized);
        // P95 lands on the single 40% reading: ceil(8 * 40 / 70) = 5
        assert_eq!(report.utilization_stats.cpu.p95, 40.0);
        assert_eq!(report.cpu.suggested_cores, 5);
        assert_eq!(report.memory.recommendation, Classification::Optimal);
        assert_eq!(report.overall.primary_concern, Some(Concern::Cpu));
        assert_eq!(report.overall.action_priority, ActionPriority::Low);
    }

    #[tokio::test]
    async fn test_insufficient_data_echoes_specs() {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_vdi(vdi("v1", "h1", 4, 8_192, 100)).await;
        // only a reading older than the window
        store
            .record_sample(sample_at("v1", Utc::now() - Duration::hours(30), 5.0, 5.0))
            .await;

        let outcome = analyzer(&store).analyze_vm("v1", Some(24)).await.unwrap();
        match outcome {
            SizingOutcome::InsufficientData {
                data_points,
                current_specs,
                ..
            } => {
                assert_eq!(data_points, 0);
                assert_eq!(current_specs.cpu.cores, 4);
            }
            other => panic!("expected insufficient data, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lookback_extends_window() {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_vdi(vdi("v1", "h1", 4, 8_192, 100)).await;
        store
            .record_sample(sample_at("v1", Utc::now() - Duration::hours(30), 50.0, 50.0))
            .await;

        let outcome = analyzer(&store).analyze_vm("v1", Some(48)).await.unwrap();
        assert!(outcome.report().is_some());
    }

    #[tokio::test]
    async fn test_unknown_vm_and_bad_window() {
        let store = Arc::new(InMemoryStore::new());
        let analyzer = analyzer(&store);
        assert!(matches!(
            analyzer.analyze_vm("ghost", None).await,
            Err(EngineError::NotFound { kind: "vdi", .. })
        ));
        assert!(matches!(
            analyzer.analyze_vm("ghost", Some(0)).await,
            Err(EngineError::Validation(_))
        ));
    }
}
