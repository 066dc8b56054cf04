//! VDI capacity planner CLI
//!
//! Runs capacity, profile and sizing operations in-process against an
//! inventory snapshot file.

mod commands;
mod config;
mod engine;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{capacity, plan, profiles, sizing};
use planner_lib::CycleOptions;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::engine::Engine;
use crate::output::OutputFormat;

/// VDI capacity planner CLI
#[derive(Parser)]
#[command(name = "capctl")]
#[command(author, version, about = "CLI for the VDI Capacity Planner", long_about = None)]
pub struct Cli {
    /// Inventory snapshot file (can also be set via CAPCTL_SNAPSHOT env var)
    #[arg(long, short, env = "CAPCTL_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<OutputFormat>,

    /// Write derived capacity and profile changes back to the snapshot
    #[arg(long)]
    pub write_back: bool,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Cluster capacity
    #[command(subcommand)]
    Capacity(CapacityCommands),

    /// Allocation profiles
    #[command(subcommand)]
    Profiles(ProfileCommands),

    /// VM right-sizing
    #[command(subcommand)]
    Sizing(SizingCommands),

    /// Run a full planning cycle for a cluster
    Plan {
        /// Cluster ID
        cluster: String,

        /// Also right-size the cluster's active VMs
        #[arg(long)]
        with_sizing: bool,

        /// Sizing lookback in hours
        #[arg(long)]
        hours: Option<u32>,
    },
}

#[derive(Subcommand)]
pub enum CapacityCommands {
    /// Recalculate a cluster's capacity from its hosts and VMs
    Recalculate {
        /// Cluster ID
        cluster: String,
    },

    /// Show capacity of every active cluster in an organization
    Status {
        /// Organization ID
        organization: String,
    },

    /// Show capacity recommendations for a cluster
    Recommendations {
        /// Cluster ID
        cluster: String,
    },
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Discover auto profiles from the cluster's VMs
    Generate {
        /// Cluster ID
        cluster: String,
    },

    /// List a cluster's profiles
    List {
        /// Cluster ID
        cluster: String,
    },

    /// Create a curated profile
    Create {
        /// Cluster ID
        cluster: String,

        /// Profile name, unique within the cluster
        #[arg(long)]
        name: String,

        /// vCPU count (1-32)
        #[arg(long)]
        cores: u32,

        /// Reserved MHz, cores x default MHz per core when omitted
        #[arg(long)]
        mhz: Option<u64>,

        /// Memory in MB (at least 512)
        #[arg(long)]
        memory_mb: u64,

        /// Disk in GB
        #[arg(long)]
        storage_gb: u64,

        /// Tags, repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Delete a profile with no current instances
    Delete {
        /// Profile ID
        profile: String,
    },
}

#[derive(Subcommand)]
pub enum SizingCommands {
    /// Right-size a single VM
    Analyze {
        /// VM ID
        vdi: String,

        /// Lookback in hours
        #[arg(long)]
        hours: Option<u32>,
    },

    /// Right-size every active VM of an organization
    Bulk {
        /// Organization ID
        organization: String,

        /// Lookback in hours
        #[arg(long)]
        hours: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = config::Config::load()?;
    let format = cli
        .format
        .or_else(|| config.default_format.as_deref().and_then(OutputFormat::from_name))
        .unwrap_or_default();
    let snapshot = config.snapshot(cli.snapshot.as_deref())?;

    let engine = Engine::open(&snapshot, config.engine(), cli.write_back).await?;

    // Execute command
    match cli.command {
        Commands::Capacity(capacity_cmd) => match capacity_cmd {
            CapacityCommands::Recalculate { cluster } => {
                capacity::recalculate(&engine, &cluster, format).await?;
            }
            CapacityCommands::Status { organization } => {
                capacity::status(&engine, &organization, format).await?;
            }
            CapacityCommands::Recommendations { cluster } => {
                capacity::recommendations(&engine, &cluster, format).await?;
            }
        },
        Commands::Profiles(profile_cmd) => match profile_cmd {
            ProfileCommands::Generate { cluster } => {
                profiles::generate(&engine, &cluster, format).await?;
            }
            ProfileCommands::List { cluster } => {
                profiles::list(&engine, &cluster, format).await?;
            }
            ProfileCommands::Create {
                cluster,
                name,
                cores,
                mhz,
                memory_mb,
                storage_gb,
                tags,
            } => {
                let args = profiles::CreateArgs {
                    cluster_id: cluster,
                    name,
                    cores,
                    mhz,
                    memory_mb,
                    storage_gb,
                    tags,
                };
                profiles::create(&engine, args, format).await?;
            }
            ProfileCommands::Delete { profile } => {
                profiles::delete(&engine, &profile, format).await?;
            }
        },
        Commands::Sizing(sizing_cmd) => match sizing_cmd {
            SizingCommands::Analyze { vdi, hours } => {
                sizing::analyze(&engine, &vdi, hours, format).await?;
            }
            SizingCommands::Bulk {
                organization,
                hours,
            } => {
                sizing::bulk(&engine, &organization, hours, format).await?;
            }
        },
        Commands::Plan {
            cluster,
            with_sizing,
            hours,
        } => {
            let options = CycleOptions {
                analyze_sizing: with_sizing,
                hours,
            };
            plan::run(&engine, &cluster, options, format).await?;
        }
    }

    if engine.finish().await? && format == OutputFormat::Table {
        output::print_info(&format!("Snapshot written to {}", snapshot.display()));
    }

    Ok(())
}
