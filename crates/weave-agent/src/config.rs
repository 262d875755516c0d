//! Fabric configuration.
//!
//! One JSON document configures every layer of the fabric:
//! - Scheduling, health thresholds and the GAP latency model
//! - Container lifecycle timing
//! - Migration thresholds and history retention
//! - Background agent intervals
//! - The simulation harness

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use weave_container::LifecycleConfig;
use weave_migration::MigrationConfig;
use weave_scheduler::SchedulerConfig;

use crate::error::{FabricError, Result};

/// Intervals and retry behavior of the background agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Period of the dead-node sweep.
    pub dead_node_sweep_secs: f64,
    /// Attempts the dead-node sweep makes to reach the actor per tick.
    pub dead_node_sweep_attempts: u32,
    /// Period of the warm-container reaper.
    pub reaper_secs: f64,
    /// Period of the reassignment scan.
    pub reassign_secs: f64,
    /// Period of the inactive-user sweep.
    pub user_sweep_secs: f64,
    /// Period of the function-execution driver (simulation only).
    pub execution_secs: f64,
    /// Period of the auto-migration scan.
    pub auto_migration_secs: f64,
    /// Whether the auto-migration scan runs at all.
    pub auto_migration: bool,
    /// Pause after a failed iteration before the loop continues.
    pub error_backoff_secs: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            dead_node_sweep_secs: 10.0,
            dead_node_sweep_attempts: 3,
            reaper_secs: 5.0,
            reassign_secs: 0.5,
            user_sweep_secs: 2.0,
            execution_secs: 15.0,
            auto_migration_secs: 10.0,
            auto_migration: true,
            error_backoff_secs: 1.0,
        }
    }
}

/// Settings of the `weaved simulate` harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Edge nodes registered at start.
    pub edge_nodes: usize,
    /// Users moving through the area.
    pub users: usize,
    /// Width of the simulated area, in simulation units.
    pub area_width: f64,
    /// Height of the simulated area, in simulation units.
    pub area_height: f64,
    /// Coverage radius of every simulated edge node.
    pub coverage_radius: f64,
    /// Time between trace steps.
    pub step_secs: f64,
    /// Longest distance a user moves in one step.
    pub max_step_distance: f64,
    /// Request size of every simulated user, in bytes.
    pub request_size_bytes: u64,
    /// Wall-clock length of the run.
    pub duration_secs: f64,
    /// Period of the synthetic metrics reporters.
    pub metrics_interval_secs: f64,
    /// Function invoked by the execution driver.
    pub function_name: String,
    /// Image the function containers are created from.
    pub function_image: String,
    /// Shortest simulated computation.
    pub min_execution_ms: u64,
    /// Longest simulated computation.
    pub max_execution_ms: u64,
    /// Extra time charged to cold starts.
    pub cold_start_penalty_ms: u64,
    /// Seed for reproducible traces.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            edge_nodes: 4,
            users: 20,
            area_width: 1200.0,
            area_height: 800.0,
            coverage_radius: 300.0,
            step_secs: 0.5,
            max_step_distance: 20.0,
            request_size_bytes: 1_000_000,
            duration_secs: 30.0,
            metrics_interval_secs: 2.0,
            function_name: "echo".to_string(),
            function_image: "edgeweave/echo:latest".to_string(),
            min_execution_ms: 50,
            max_execution_ms: 400,
            cold_start_penalty_ms: 300,
            seed: None,
        }
    }
}

/// Complete fabric configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    /// Registry and placement.
    pub scheduler: SchedulerConfig,
    /// Container lifecycle.
    pub lifecycle: LifecycleConfig,
    /// Migration thresholds.
    pub migration: MigrationConfig,
    /// Background agents.
    pub agents: AgentConfig,
    /// Simulation harness.
    pub simulation: SimulationConfig,
    /// Capacity of the actor's command channel.
    pub command_buffer: usize,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            lifecycle: LifecycleConfig::default(),
            migration: MigrationConfig::default(),
            agents: AgentConfig::default(),
            simulation: SimulationConfig::default(),
            command_buffer: 256,
        }
    }
}

impl FabricConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            FabricError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| FabricError::Config(format!("invalid JSON: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| FabricError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        self.scheduler
            .validate()
            .map_err(|e| FabricError::Config(e.to_string()))?;
        self.migration
            .validate()
            .map_err(|e| FabricError::Config(e.to_string()))?;

        if !(self.lifecycle.max_warm_time_secs.is_finite() && self.lifecycle.max_warm_time_secs >= 0.0)
        {
            return Err(FabricError::Config(
                "max_warm_time_secs must be non-negative".to_string(),
            ));
        }

        let agents = &self.agents;
        let periods = [
            ("dead_node_sweep_secs", agents.dead_node_sweep_secs),
            ("reaper_secs", agents.reaper_secs),
            ("reassign_secs", agents.reassign_secs),
            ("user_sweep_secs", agents.user_sweep_secs),
            ("execution_secs", agents.execution_secs),
            ("auto_migration_secs", agents.auto_migration_secs),
        ];
        for (name, secs) in periods {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(FabricError::Config(format!("{name} must be positive")));
            }
        }
        if !(agents.error_backoff_secs.is_finite() && agents.error_backoff_secs >= 0.0) {
            return Err(FabricError::Config(
                "error_backoff_secs must be non-negative".to_string(),
            ));
        }
        if agents.dead_node_sweep_attempts == 0 {
            return Err(FabricError::Config(
                "dead_node_sweep_attempts must be at least 1".to_string(),
            ));
        }

        if self.command_buffer == 0 {
            return Err(FabricError::Config(
                "command_buffer must be at least 1".to_string(),
            ));
        }

        self.simulation.validate()
    }
}

impl SimulationConfig {
    /// Validate the simulation settings.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("area_width", self.area_width),
            ("area_height", self.area_height),
            ("step_secs", self.step_secs),
            ("duration_secs", self.duration_secs),
            ("metrics_interval_secs", self.metrics_interval_secs),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(FabricError::Config(format!("simulation.{name} must be positive")));
            }
        }
        if !(self.coverage_radius.is_finite() && self.coverage_radius >= 0.0) {
            return Err(FabricError::Config(
                "simulation.coverage_radius must be non-negative".to_string(),
            ));
        }
        if !(self.max_step_distance.is_finite() && self.max_step_distance >= 0.0) {
            return Err(FabricError::Config(
                "simulation.max_step_distance must be non-negative".to_string(),
            ));
        }
        if self.min_execution_ms > self.max_execution_ms {
            return Err(FabricError::Config(
                "simulation.min_execution_ms cannot exceed max_execution_ms".to_string(),
            ));
        }
        if self.function_name.trim().is_empty() || self.function_image.trim().is_empty() {
            return Err(FabricError::Config(
                "simulation function name and image are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Converts a validated seconds value into a [`Duration`].
pub(crate) fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}
