//! In-process engine over a snapshot file

use anyhow::{Context, Result};
use planner_lib::{EngineConfig, InMemoryStore, PlanningOrchestrator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Orchestrator bound to one inventory snapshot
pub struct Engine {
    store: Arc<InMemoryStore>,
    orchestrator: PlanningOrchestrator,
    snapshot_path: PathBuf,
    write_back: bool,
}

impl Engine {
    pub async fn open(snapshot_path: &Path, config: EngineConfig, write_back: bool) -> Result<Self> {
        let store = Arc::new(
            InMemoryStore::load(snapshot_path)
                .await
                .context("Failed to open inventory snapshot")?,
        );
        let orchestrator =
            PlanningOrchestrator::new(store.clone(), store.clone(), store.clone(), config)
                .context("Invalid engine configuration")?;

        Ok(Self {
            store,
            orchestrator,
            snapshot_path: snapshot_path.to_path_buf(),
            write_back,
        })
    }

    pub fn orchestrator(&self) -> &PlanningOrchestrator {
        &self.orchestrator
    }

    /// Persist mutations to the snapshot when `--write-back` was given.
    /// Returns whether the file was written.
    pub async fn finish(&self) -> Result<bool> {
        if !self.write_back {
            return Ok(false);
        }
        self.store.save(&self.snapshot_path).await?;
        debug!(path = %self.snapshot_path.display(), "Snapshot written back");
        Ok(true)
    }
}
