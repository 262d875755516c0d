//! weaved - Edgeweave fabric daemon
//!
//! Runs the central/edge fabric with its background agents, or drives it
//! through a self-contained simulation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use weave_agent::{AgentSet, FabricConfig, Simulation, TraceFeed, TraceReplay, spawn_fabric};
use weave_container::{ContainerRuntime, SimulatedRuntime};
use weave_scheduler::AssignmentAlgorithm;

#[derive(Parser)]
#[command(name = "weaved")]
#[command(about = "Edgeweave central/edge serverless fabric")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fabric and its background agents until interrupted
    Run {
        /// Path to config file
        #[arg(short, long, env = "WEAVED_CONFIG")]
        config: Option<PathBuf>,

        /// Seconds between status summaries in the log
        #[arg(long, default_value_t = 30)]
        status_interval: u64,
    },

    /// Drive the fabric with a mobility trace and synthetic node metrics
    Simulate {
        /// Path to config file
        #[arg(short, long, env = "WEAVED_CONFIG")]
        config: Option<PathBuf>,

        /// Replay a recorded trace (JSON array of rows) instead of a random walk
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Run length in seconds
        #[arg(long)]
        duration: Option<f64>,

        /// Number of edge nodes
        #[arg(long)]
        edges: Option<usize>,

        /// Number of random-walk users
        #[arg(long)]
        users: Option<usize>,

        /// Assignment algorithm (greedy, gap, predictive)
        #[arg(long)]
        algorithm: Option<AssignmentAlgorithm>,

        /// Seed for a reproducible random walk
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Generate a default config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "weaved.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG replaces the defaults entirely.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "weaved=info,weave_agent=info,weave_scheduler=info,weave_container=info,weave_migration=info",
        )
    });
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            status_interval,
        } => {
            run_fabric(config.as_deref(), status_interval).await?;
        }
        Commands::Simulate {
            config,
            trace,
            duration,
            edges,
            users,
            algorithm,
            seed,
        } => {
            let mut config = load_config(config.as_deref())?;
            let sim = &mut config.simulation;
            if let Some(duration) = duration {
                sim.duration_secs = duration;
            }
            if let Some(edges) = edges {
                sim.edge_nodes = edges;
            }
            if let Some(users) = users {
                sim.users = users;
            }
            if seed.is_some() {
                sim.seed = seed;
            }
            if let Some(algorithm) = algorithm {
                config.scheduler.algorithm = algorithm;
            }
            config.validate()?;
            simulate(config, trace.as_deref()).await?;
        }
        Commands::InitConfig { output } => {
            init_config(&output)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<FabricConfig> {
    match path {
        Some(path) => {
            let config = FabricConfig::from_file(path)?;
            info!(config = %path.display(), "loaded config");
            Ok(config)
        }
        None => Ok(FabricConfig::default()),
    }
}

async fn run_fabric(config_path: Option<&Path>, status_interval: u64) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    info!(
        algorithm = %config.scheduler.algorithm,
        heartbeat_timeout_secs = config.scheduler.heartbeat_timeout_secs,
        "starting weaved"
    );

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(SimulatedRuntime::new());
    let (handle, actor) = spawn_fabric(&config, Some(runtime));
    let agents = AgentSet::spawn(&handle, &config.agents, None);

    let mut summary = tokio::time::interval(Duration::from_secs(status_interval.max(1)));
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "signal handler failed");
                }
                info!("shutdown requested");
                break;
            }
            _ = summary.tick() => {
                match handle.cluster_status().await {
                    Ok(status) => info!(
                        edges = status.edge_nodes.len(),
                        users = status.total_users(),
                        healthy = status.health.healthy,
                        warning = status.health.warning,
                        unhealthy = status.health.unhealthy,
                        "fabric status"
                    ),
                    Err(e) => {
                        warn!(error = %e, "status unavailable");
                        break;
                    }
                }
            }
        }
    }

    agents.shutdown().await;
    drop(handle);
    actor.await?;
    Ok(())
}

async fn simulate(config: FabricConfig, trace: Option<&Path>) -> anyhow::Result<()> {
    let mut simulation = Simulation::new(config);
    if let Some(path) = trace {
        let replay = TraceReplay::from_file(path)?;
        info!(trace = %path.display(), steps = replay.remaining(), "replaying trace");
        simulation = simulation.with_feed(TraceFeed::Replay(replay));
    }

    let report = simulation.run().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_config(output: &Path) -> anyhow::Result<()> {
    FabricConfig::default().save(output)?;
    println!("Config written to {}", output.display());
    println!();
    println!("Edit the file to tune the fabric, then run:");
    println!("  weaved run --config {}", output.display());
    println!("  weaved simulate --config {}", output.display());
    Ok(())
}
