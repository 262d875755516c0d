//! Simulation harness behind `weaved simulate`.
//!
//! The harness plays every external collaborator at once: it registers a
//! grid of edge nodes, reports synthetic metrics for them (which doubles as
//! their heartbeat), feeds a mobility trace, and lets the background agents
//! run function invocations against a [`SimulatedRuntime`]. When the run
//! ends it returns a [`SimulationReport`].

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};
use weave_container::{ContainerRuntime, SimulatedRuntime};
use weave_core::{Location, NodeId, NodeMetrics, SystemInfo};
use weave_migration::MigrationStats;
use weave_scheduler::{AssignmentStats, ClusterStatus, EdgeNodeRegistration, LoadPredictor, MetricsReport};

use crate::actor::FabricActor;
use crate::agents::{AgentSet, ExecutionDriver};
use crate::config::{FabricConfig, SimulationConfig, secs};
use crate::error::Result;
use crate::executor::SimulatedExecutor;
use crate::handle::FabricHandle;
use crate::trace::{RandomWalkTrace, TraceFeed};

/// Outcome of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Trace steps applied.
    pub steps: u64,
    /// Trace rows accepted.
    pub trace_rows: usize,
    /// Trace rows rejected.
    pub rejected_rows: usize,
    /// Final state of the fabric.
    pub status: ClusterStatus,
    /// Migration figures.
    pub migrations: MigrationStats,
    /// GAP view of the final user positions, if the solver is available.
    pub gap: Option<AssignmentStats>,
}

/// Evenly spaced edge node positions covering the area.
#[must_use]
pub fn edge_grid(count: usize, width: f64, height: f64) -> Vec<Location> {
    if count == 0 {
        return Vec::new();
    }
    let cols = (count as f64).sqrt().ceil() as usize;
    let rows = count.div_ceil(cols);
    (0..count)
        .map(|i| {
            let (row, col) = (i / cols, i % cols);
            Location::new(
                (col as f64 + 0.5) * width / cols as f64,
                (row as f64 + 0.5) * height / rows as f64,
            )
        })
        .collect()
}

/// Load of one simulated edge node, drifting at random.
#[derive(Debug, Clone)]
struct SyntheticNode {
    id: NodeId,
    metrics: NodeMetrics,
    reported_info: bool,
}

/// Metrics reporters for every simulated edge node.
#[derive(Debug)]
pub struct SyntheticReporters {
    rng: StdRng,
    nodes: Vec<SyntheticNode>,
    interval_secs: f64,
}

impl SyntheticReporters {
    /// Reporters for `node_ids`, starting at moderate load.
    #[must_use]
    pub fn new(node_ids: Vec<NodeId>, config: &SimulationConfig) -> Self {
        let mut rng = config
            .seed
            .map_or_else(StdRng::from_entropy, |s| StdRng::seed_from_u64(s.wrapping_add(1)));
        let nodes = node_ids
            .into_iter()
            .map(|id| SyntheticNode {
                id,
                metrics: NodeMetrics::with_usage(rng.gen_range(10.0..50.0), rng.gen_range(20.0..60.0)),
                reported_info: false,
            })
            .collect();
        Self {
            rng,
            nodes,
            interval_secs: config.metrics_interval_secs,
        }
    }

    /// Drifts every node's load and returns one report per node.
    pub fn next_reports(&mut self) -> Vec<MetricsReport> {
        let mut reports = Vec::with_capacity(self.nodes.len());
        for node in &mut self.nodes {
            let m = &mut node.metrics;
            m.cpu_percent = (m.cpu_percent + self.rng.gen_range(-8.0..=8.0)).clamp(5.0, 98.0);
            m.memory_percent = (m.memory_percent + self.rng.gen_range(-5.0..=5.0)).clamp(10.0, 95.0);
            m.load_average = m.cpu_percent / 25.0;
            // ~15 W idle to ~65 W at full load.
            m.energy_joules += (15.0 + 0.5 * m.cpu_percent) * self.interval_secs;

            let mut report = MetricsReport::new(node.id.clone(), m.clone());
            if !node.reported_info {
                report.system_info = Some(SystemInfo {
                    hostname: node.id.clone(),
                    cpu_count: 4,
                    memory_total_mb: 8192,
                    platform: "simulated".to_string(),
                });
                node.reported_info = true;
            }
            reports.push(report);
        }
        reports
    }

    /// Sends one round of reports.
    ///
    /// # Errors
    ///
    /// Fails only if the actor is gone; rejected reports are logged.
    pub async fn report(&mut self, handle: &FabricHandle) -> Result<()> {
        for report in self.next_reports() {
            let node_id = report.node_id.clone();
            match handle.update_node_metrics(report).await {
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(node = %node_id, error = %e, "metrics report rejected"),
            }
        }
        Ok(())
    }
}

/// A configured simulation run.
#[derive(Debug)]
pub struct Simulation {
    config: FabricConfig,
    feed: TraceFeed,
    predictor: Option<Arc<dyn LoadPredictor>>,
}

impl Simulation {
    /// Simulation driven by a random walk of `config.simulation.users`.
    #[must_use]
    pub fn new(config: FabricConfig) -> Self {
        let feed = TraceFeed::RandomWalk(RandomWalkTrace::new(&config.simulation));
        Self {
            config,
            feed,
            predictor: None,
        }
    }

    /// Replaces the trace feed.
    #[must_use]
    pub fn with_feed(mut self, feed: TraceFeed) -> Self {
        self.feed = feed;
        self
    }

    /// Attaches a load predictor for the predictive strategy.
    #[must_use]
    pub fn with_predictor(mut self, predictor: Arc<dyn LoadPredictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    /// Runs until the duration elapses or a replayed trace is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the fabric rejects the simulated nodes or the
    /// actor stops unexpectedly.
    pub async fn run(self) -> Result<SimulationReport> {
        let Self {
            config,
            mut feed,
            predictor,
        } = self;
        let sim = &config.simulation;

        let runtime: Arc<dyn ContainerRuntime> = Arc::new(SimulatedRuntime::new());
        let (mut actor, handle) = FabricActor::new(&config, Some(runtime));
        if let Some(predictor) = predictor {
            actor = actor.with_predictor(predictor);
        }
        let actor_task = actor.spawn();

        let mut node_ids = Vec::with_capacity(sim.edge_nodes);
        for (i, location) in edge_grid(sim.edge_nodes, sim.area_width, sim.area_height)
            .into_iter()
            .enumerate()
        {
            let id = format!("edge-{i}");
            handle
                .register_edge_node(
                    EdgeNodeRegistration::new(id.clone(), location)
                        .with_coverage(sim.coverage_radius)
                        .with_endpoint(format!("http://{id}:8000")),
                )
                .await?;
            node_ids.push(id);
        }
        let mut reporters = SyntheticReporters::new(node_ids, sim);
        handle.set_trace_replay(true).await?;

        let driver = ExecutionDriver {
            executor: Arc::new(SimulatedExecutor::from_config(sim)),
            function: sim.function_name.clone(),
            image: sim.function_image.clone(),
        };
        let agents = AgentSet::spawn(&handle, &config.agents, Some(driver));
        info!(
            edges = sim.edge_nodes,
            duration_secs = sim.duration_secs,
            agents = ?agents.names(),
            "simulation started"
        );

        let outcome = drive(&handle, &mut feed, &mut reporters, sim).await;

        agents.shutdown().await;
        let (steps, trace_rows, rejected_rows) = outcome?;
        handle.set_trace_replay(false).await?;

        let status = handle.cluster_status().await?;
        let migrations = handle.migration_stats().await?;
        let gap = match handle.gap_plan().await {
            Ok((_, stats)) => Some(stats),
            Err(e) => {
                warn!(error = %e, "GAP plan unavailable");
                None
            }
        };

        drop(handle);
        if let Err(e) = actor_task.await {
            warn!(error = %e, "fabric actor ended abnormally");
        }
        info!(
            steps,
            users = status.total_users(),
            migrations = migrations.completed,
            "simulation finished"
        );

        Ok(SimulationReport {
            steps,
            trace_rows,
            rejected_rows,
            status,
            migrations,
            gap,
        })
    }
}

/// Feeds trace steps and metrics until the deadline or the end of a replay.
async fn drive(
    handle: &FabricHandle,
    feed: &mut TraceFeed,
    reporters: &mut SyntheticReporters,
    sim: &SimulationConfig,
) -> Result<(u64, usize, usize)> {
    let mut trace_tick = tokio::time::interval(secs(sim.step_secs));
    let mut metrics_tick = tokio::time::interval(secs(sim.metrics_interval_secs));
    let deadline = tokio::time::sleep(secs(sim.duration_secs));
    tokio::pin!(deadline);

    let (mut steps, mut applied, mut rejected) = (0_u64, 0_usize, 0_usize);
    loop {
        tokio::select! {
            () = &mut deadline => break,
            _ = metrics_tick.tick() => reporters.report(handle).await?,
            _ = trace_tick.tick() => {
                let Some(batch) = feed.next_batch() else {
                    info!(steps, "trace exhausted");
                    break;
                };
                let result = handle.apply_trace_steps(batch).await?;
                steps += 1;
                applied += result.applied;
                rejected += result.rejected;
                debug!(step = steps, applied = result.applied, "trace step applied");
            }
        }
    }
    Ok((steps, applied, rejected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_grid_layout() {
        assert!(edge_grid(0, 100.0, 100.0).is_empty());

        let grid = edge_grid(4, 1200.0, 800.0);
        assert_eq!(
            grid,
            vec![
                Location::new(300.0, 200.0),
                Location::new(900.0, 200.0),
                Location::new(300.0, 600.0),
                Location::new(900.0, 600.0),
            ]
        );

        let grid = edge_grid(5, 900.0, 600.0);
        assert_eq!(grid.len(), 5);
        assert!(grid.iter().all(|l| l.x < 900.0 && l.y < 600.0));
    }

    #[test]
    fn test_synthetic_reports_stay_in_range() {
        let config = SimulationConfig {
            seed: Some(3),
            ..SimulationConfig::default()
        };
        let mut reporters =
            SyntheticReporters::new(vec!["edge-0".to_string(), "edge-1".to_string()], &config);

        let first = reporters.next_reports();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|r| r.system_info.is_some()));

        for _ in 0..100 {
            for report in reporters.next_reports() {
                assert!(report.system_info.is_none());
                assert!((5.0..=98.0).contains(&report.metrics.cpu_percent));
                assert!((10.0..=95.0).contains(&report.metrics.memory_percent));
                assert!(report.metrics.energy_joules > 0.0);
            }
        }
    }
}
