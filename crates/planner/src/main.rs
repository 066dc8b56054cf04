//! Capacity planner daemon
//!
//! Loads an inventory snapshot, plans every active cluster on an interval and
//! serves health and metrics endpoints.

mod api;
mod config;
mod scheduler;

use anyhow::Result;
use planner_lib::health::components;
use planner_lib::{
    CycleOptions, HealthRegistry, InMemoryStore, PlanningOrchestrator, StructuredLogger,
};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::api::AppState;
use crate::config::PlannerConfig;
use crate::scheduler::PlanningLoop;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting capacity planner");

    let config = PlannerConfig::load()?;
    info!(?config, "Loaded configuration");

    let health_registry = HealthRegistry::new();
    health_registry.register(components::AGGREGATOR).await;
    health_registry.register(components::PROFILE_MANAGER).await;
    health_registry.register(components::SIZING_ANALYZER).await;
    health_registry.register(components::INVENTORY).await;

    let app_state = Arc::new(AppState::new(health_registry.clone()));
    let api_port = config.api_port;
    let api_state = app_state.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, api_state).await {
            error!(error = %e, "API server error");
        }
    });

    let store = match InMemoryStore::load(&config.snapshot_path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            health_registry
                .set_unhealthy(components::INVENTORY, e.to_string())
                .await;
            error!(path = %config.snapshot_path.display(), error = %e, "Failed to load inventory snapshot");
            api_handle.abort();
            return Err(e);
        }
    };
    let cluster_count = store.snapshot().await.clusters.len();

    let logger = StructuredLogger::new(config.instance_name.clone());
    let orchestrator = PlanningOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        config.engine.clone(),
    )?
    .with_health(health_registry.clone())
    .with_logger(logger.clone());

    health_registry.set_ready(true).await;
    logger.log_startup(env!("CARGO_PKG_VERSION"), cluster_count);

    let options = CycleOptions {
        analyze_sizing: config.analyze_sizing,
        hours: config.sizing_hours,
    };
    let mut planning = PlanningLoop::new(
        Arc::new(orchestrator),
        store,
        options,
        config.plan_interval(),
    );
    if config.write_back {
        planning = planning.with_write_back(config.snapshot_path.clone());
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let planning_handle = tokio::spawn(Arc::new(planning).run(shutdown_tx.subscribe()));

    info!("Capacity planner started successfully");

    signal::ctrl_c().await?;
    logger.log_shutdown("ctrl_c");

    let _ = shutdown_tx.send(());
    if let Err(e) = planning_handle.await {
        error!(error = %e, "Planning loop task failed");
    }
    api_handle.abort();

    Ok(())
}
