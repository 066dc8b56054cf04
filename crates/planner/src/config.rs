//! Daemon configuration

use anyhow::{Context, Result};
use planner_lib::EngineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an optional config file
pub const CONFIG_FILE_ENV: &str = "PLANNER_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    /// Instance name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Port for health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Inventory snapshot the in-memory store is loaded from
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Seconds between planning rounds
    #[serde(default = "default_plan_interval")]
    pub plan_interval_secs: u64,

    /// Run bulk sizing as part of every cycle
    #[serde(default)]
    pub analyze_sizing: bool,

    /// Sizing lookback, engine default when unset
    #[serde(default)]
    pub sizing_hours: Option<u32>,

    /// Persist derived capacity and profiles back to the snapshot after each round
    #[serde(default)]
    pub write_back: bool,

    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "capacity-planner".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("inventory.json")
}

fn default_plan_interval() -> u64 {
    900
}

impl PlannerConfig {
    /// Load from the optional config file, then `PLANNER_*` environment
    /// variables. Nested engine keys use `__`, e.g.
    /// `PLANNER_ENGINE__FETCH_TIMEOUT_MS`.
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
        Self::load_from(file.as_deref())
    }

    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("PLANNER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read planner configuration")?;

        let parsed: PlannerConfig = config
            .try_deserialize()
            .context("Invalid planner configuration")?;
        parsed
            .engine
            .validate()
            .context("Invalid engine configuration")?;
        Ok(parsed)
    }

    pub fn plan_interval(&self) -> Duration {
        Duration::from_secs(self.plan_interval_secs.max(1))
    }
}
