//! Migration manager: request tracking and the phase state machine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use weave_container::{Container, ContainerId};
use weave_core::{HealthStatus, NodeMetrics};

use crate::backend::MigrationBackend;
use crate::error::{MigrationError, Result};
use crate::history::{DEFAULT_HISTORY_LIMIT, MigrationHistory};
use crate::types::{
    INITIAL_PROGRESS, MigrationId, MigrationPhase, MigrationReason, MigrationRequest,
    MigrationState, MigrationStats, MigrationStatus,
};

/// Migration thresholds and retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// CPU usage, in percent, above which containers are moved off a node.
    pub cpu_threshold_percent: f64,
    /// Memory usage, in percent, above which containers are moved off a node.
    pub memory_threshold_percent: f64,
    /// Finished migrations retained in the history.
    pub history_limit: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            cpu_threshold_percent: 80.0,
            memory_threshold_percent: 90.0,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl MigrationConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a threshold is outside 0-100.
    pub fn validate(&self) -> Result<()> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_range(self.cpu_threshold_percent) || !in_range(self.memory_threshold_percent) {
            return Err(MigrationError::InvalidRequest(
                "migration thresholds must be within 0-100".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Totals {
    requested: u64,
    completed: u64,
    failed: u64,
    cancelled: u64,
    downtime_ms: f64,
}

/// Tracks migrations from request to history.
#[derive(Debug)]
pub struct MigrationManager {
    config: MigrationConfig,
    pending: HashMap<MigrationId, MigrationStatus>,
    active: HashMap<MigrationId, MigrationStatus>,
    history: MigrationHistory,
    totals: Totals,
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new(MigrationConfig::default())
    }
}

impl MigrationManager {
    /// Creates a manager with no migrations.
    #[must_use]
    pub fn new(config: MigrationConfig) -> Self {
        Self {
            history: MigrationHistory::new(config.history_limit),
            config,
            pending: HashMap::new(),
            active: HashMap::new(),
            totals: Totals::default(),
        }
    }

    /// Manager configuration.
    #[must_use]
    pub const fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Finished migrations.
    #[must_use]
    pub const fn history(&self) -> &MigrationHistory {
        &self.history
    }

    /// Accepts a migration request.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::InvalidRequest`] for a bad priority or node
    /// pair and [`MigrationError::ContainerBusy`] if the container already
    /// has a non-terminal migration.
    pub fn request(&mut self, request: MigrationRequest) -> Result<MigrationId> {
        self.request_at(request, Utc::now())
    }

    /// [`request`](Self::request) at a specific time.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub fn request_at(
        &mut self,
        request: MigrationRequest,
        now: DateTime<Utc>,
    ) -> Result<MigrationId> {
        if !(1..=10).contains(&request.priority) {
            return Err(MigrationError::InvalidRequest(format!(
                "priority must be within 1-10, got {}",
                request.priority
            )));
        }
        if request.source_node_id.trim().is_empty() || request.target_node_id.trim().is_empty() {
            return Err(MigrationError::InvalidRequest(
                "source and target nodes are required".to_string(),
            ));
        }
        if request.source_node_id == request.target_node_id {
            return Err(MigrationError::InvalidRequest(
                "source and target must differ".to_string(),
            ));
        }
        if self.is_busy(&request.container_id) {
            return Err(MigrationError::ContainerBusy(request.container_id));
        }

        let id = MigrationId::new();
        info!(
            migration = %id,
            container = %request.container_id,
            source = %request.source_node_id,
            target = %request.target_node_id,
            reason = %request.reason,
            priority = request.priority,
            "migration requested"
        );
        self.pending
            .insert(id, MigrationStatus::pending(id, request, now));
        self.totals.requested += 1;
        Ok(id)
    }

    /// Whether `container_id` has a pending or active migration.
    #[must_use]
    pub fn is_busy(&self, container_id: &ContainerId) -> bool {
        self.pending
            .values()
            .chain(self.active.values())
            .any(|s| &s.request.container_id == container_id)
    }

    /// Reason to move `container` off a node with `metrics` and `health`,
    /// if any.
    #[must_use]
    pub fn should_migrate(
        &self,
        container: &Container,
        metrics: &NodeMetrics,
        health: HealthStatus,
    ) -> Option<MigrationReason> {
        if !container.state.is_live() {
            return None;
        }
        if metrics.cpu_percent > self.config.cpu_threshold_percent {
            Some(MigrationReason::HighLoad)
        } else if metrics.memory_percent > self.config.memory_threshold_percent {
            Some(MigrationReason::ResourceShortage)
        } else if health == HealthStatus::Unhealthy {
            Some(MigrationReason::NodeFailure)
        } else {
            None
        }
    }

    /// Pending migrations, highest priority first, then oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<&MigrationStatus> {
        let mut pending: Vec<&MigrationStatus> = self.pending.values().collect();
        pending.sort_by(|a, b| {
            b.request
                .priority
                .cmp(&a.request.priority)
                .then(a.requested_at.cmp(&b.requested_at))
        });
        pending
    }

    /// Runs every phase of a pending migration against `backend`.
    ///
    /// A phase failure does not return an error: the migration ends
    /// `failed` with the phase and cause recorded, after a best-effort
    /// rollback. The terminal status is returned either way.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::NotFound`] for an unknown id and
    /// [`MigrationError::InvalidState`] if the migration is not pending.
    pub async fn execute<B: MigrationBackend>(
        &mut self,
        id: MigrationId,
        backend: &mut B,
    ) -> Result<MigrationStatus> {
        let mut status = self.pending.remove(&id).ok_or_else(|| self.not_pending(id))?;

        status.status = MigrationState::InProgress;
        status.start_time = Some(Utc::now());
        status.advance(INITIAL_PROGRESS);
        self.active.insert(id, status.clone());
        info!(migration = %id, "migration started");

        for phase in MigrationPhase::ALL {
            status.phase = Some(phase);
            match run_phase(backend, phase, &status).await {
                Ok(target) => {
                    if let Some(target) = target {
                        status.target_container_id = Some(target);
                    }
                    status.advance(phase.progress_after());
                    debug!(migration = %id, %phase, progress = status.progress, "phase complete");
                    if let Some(tracked) = self.active.get_mut(&id) {
                        tracked.clone_from(&status);
                    }
                }
                Err(e) => {
                    let failure = MigrationError::PhaseFailed {
                        phase,
                        cause: e.to_string(),
                    };
                    warn!(migration = %id, %phase, error = %e, "migration phase failed");
                    status.status = MigrationState::Failed;
                    status.failed_phase = Some(phase);
                    status.error = Some(failure.to_string());
                    status.end_time = Some(Utc::now());

                    if let Err(rollback_err) = backend.rollback(&status).await {
                        warn!(migration = %id, error = %rollback_err, "migration rollback failed");
                    }
                    return Ok(self.archive(status));
                }
            }
        }

        status.status = MigrationState::Completed;
        status.end_time = Some(Utc::now());
        let downtime_ms = status
            .downtime()
            .map_or(0, |d| d.num_milliseconds());
        info!(migration = %id, downtime_ms, "migration completed");
        Ok(self.archive(status))
    }

    /// Cancels a pending migration.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::NotFound`] for an unknown id and
    /// [`MigrationError::InvalidState`] once execution has started.
    pub fn cancel(&mut self, id: MigrationId) -> Result<MigrationStatus> {
        let mut status = self.pending.remove(&id).ok_or_else(|| self.not_pending(id))?;
        status.status = MigrationState::Cancelled;
        status.end_time = Some(Utc::now());
        info!(migration = %id, "migration cancelled");
        Ok(self.archive(status))
    }

    /// Current status of a migration, wherever it is tracked.
    #[must_use]
    pub fn status(&self, id: MigrationId) -> Option<MigrationStatus> {
        self.pending
            .get(&id)
            .or_else(|| self.active.get(&id))
            .or_else(|| self.history.find(&id))
            .cloned()
    }

    /// Aggregate figures over every migration seen.
    #[must_use]
    pub fn stats(&self) -> MigrationStats {
        let finished = self.totals.completed + self.totals.failed;
        #[allow(clippy::cast_precision_loss)]
        let success_rate = if finished == 0 {
            0.0
        } else {
            self.totals.completed as f64 / finished as f64
        };
        #[allow(clippy::cast_precision_loss)]
        let average_downtime_ms = if self.totals.completed == 0 {
            0.0
        } else {
            self.totals.downtime_ms / self.totals.completed as f64
        };
        MigrationStats {
            total_requested: self.totals.requested,
            completed: self.totals.completed,
            failed: self.totals.failed,
            cancelled: self.totals.cancelled,
            pending: self.pending.len(),
            active: self.active.len(),
            success_rate,
            average_downtime_ms,
        }
    }

    fn not_pending(&self, id: MigrationId) -> MigrationError {
        match self.status(id) {
            Some(status) => MigrationError::InvalidState {
                id,
                actual: status.status,
                expected: MigrationState::Pending,
            },
            None => MigrationError::NotFound(id),
        }
    }

    fn archive(&mut self, status: MigrationStatus) -> MigrationStatus {
        self.active.remove(&status.id);
        match status.status {
            MigrationState::Completed => {
                self.totals.completed += 1;
                #[allow(clippy::cast_precision_loss)]
                let downtime = status.downtime().map_or(0.0, |d| d.num_milliseconds() as f64);
                self.totals.downtime_ms += downtime;
            }
            MigrationState::Failed => self.totals.failed += 1,
            MigrationState::Cancelled => self.totals.cancelled += 1,
            MigrationState::Pending | MigrationState::InProgress => {}
        }
        self.history.record(status.clone());
        status
    }
}

async fn run_phase<B: MigrationBackend>(
    backend: &mut B,
    phase: MigrationPhase,
    status: &MigrationStatus,
) -> weave_container::ContainerResult<Option<ContainerId>> {
    match phase {
        MigrationPhase::PrepareTarget => backend.prepare_target(status).await.map(|()| None),
        MigrationPhase::CreateOnTarget => backend.create_on_target(status).await.map(Some),
        MigrationPhase::TransferState => backend.transfer_state(status).await.map(|()| None),
        MigrationPhase::StartOnTarget => backend.start_on_target(status).await.map(|()| None),
        MigrationPhase::CleanupSource => backend.cleanup_source(status).await.map(|()| None),
    }
}
