//! Capacity and allocation planning engine for VDI clusters
//!
//! This crate provides:
//! - Cluster capacity aggregation under a utilization target
//! - Automatic allocation profile discovery and maximum-slot sizing
//! - Percentile-based VM right-sizing with savings estimates
//! - A per-cluster planning orchestrator with overlap protection
//! - Health checks and observability

pub mod capacity;
pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod profiles;
pub mod sizing;
pub mod stats;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{PlannerMetrics, StructuredLogger};
pub use orchestrator::{CycleOptions, CycleOutcome, PlanningOrchestrator};
pub use store::{InMemoryStore, InventorySnapshot};
