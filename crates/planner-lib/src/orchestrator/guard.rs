//! Per-cluster run guard
//!
//! At most one planning run per cluster. A second request for a cluster that
//! is already running is refused, not queued.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Aggregating,
    ProfileReconciling,
    Analyzing,
}

impl CyclePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Aggregating => "aggregating",
            Self::ProfileReconciling => "profile_reconciling",
            Self::Analyzing => "analyzing",
        }
    }
}

/// Clusters with a run in flight, keyed by id
#[derive(Debug, Clone, Default)]
pub struct InProgressSet {
    running: Arc<DashMap<String, CyclePhase>>,
}

impl InProgressSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim the cluster. Returns `None` when a run already holds it.
    pub fn try_acquire(&self, cluster_id: &str, phase: CyclePhase) -> Option<CycleGuard> {
        match self.running.entry(cluster_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(phase);
                Some(CycleGuard {
                    running: self.running.clone(),
                    cluster_id: cluster_id.to_string(),
                })
            }
        }
    }

    pub fn phase(&self, cluster_id: &str) -> CyclePhase {
        self.running
            .get(cluster_id)
            .map(|phase| *phase)
            .unwrap_or(CyclePhase::Idle)
    }

    pub fn is_running(&self, cluster_id: &str) -> bool {
        self.running.contains_key(cluster_id)
    }
}

/// Claim on a cluster; released on drop, including on early return
#[derive(Debug)]
pub struct CycleGuard {
    running: Arc<DashMap<String, CyclePhase>>,
    cluster_id: String,
}

impl CycleGuard {
    pub fn advance(&self, phase: CyclePhase) {
        if let Some(mut current) = self.running.get_mut(&self.cluster_id) {
            *current = phase;
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.running
            .get(&self.cluster_id)
            .map(|phase| *phase)
            .unwrap_or(CyclePhase::Idle)
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.running.remove(&self.cluster_id);
    }
}
