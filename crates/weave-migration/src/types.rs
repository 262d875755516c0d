//! Migration requests, statuses and the phase protocol.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use weave_container::ContainerId;
use weave_core::NodeId;

use crate::error::MigrationError;

/// Unique identifier for a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MigrationId(Uuid);

impl MigrationId {
    /// Generates a new random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MigrationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MigrationId {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| MigrationError::InvalidRequest(format!("invalid migration id: {e}")))
    }
}

/// Why a container is being moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationReason {
    /// Source CPU above the migration threshold.
    HighLoad,
    /// Source memory above the migration threshold.
    ResourceShortage,
    /// Users would see lower latency elsewhere.
    NetworkLatency,
    /// Source node is unhealthy.
    NodeFailure,
    /// Operator-driven rebalancing.
    LoadBalancing,
}

impl MigrationReason {
    /// Priority used when the agent requests a migration for this reason.
    #[must_use]
    pub const fn default_priority(&self) -> u8 {
        match self {
            Self::NodeFailure => 9,
            Self::ResourceShortage => 7,
            Self::HighLoad => 6,
            Self::NetworkLatency => 4,
            Self::LoadBalancing => 3,
        }
    }

    /// Upper-case name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::HighLoad => "HIGH_LOAD",
            Self::ResourceShortage => "RESOURCE_SHORTAGE",
            Self::NetworkLatency => "NETWORK_LATENCY",
            Self::NodeFailure => "NODE_FAILURE",
            Self::LoadBalancing => "LOAD_BALANCING",
        }
    }
}

impl fmt::Display for MigrationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    /// Requested, not started.
    Pending,
    /// Phases are running.
    InProgress,
    /// All phases succeeded.
    Completed,
    /// A phase failed.
    Failed,
    /// Cancelled before it started.
    Cancelled,
}

impl MigrationState {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Snake-case name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The five ordered migration phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    /// Check the target can host the container.
    PrepareTarget,
    /// Create the replacement container on the target.
    CreateOnTarget,
    /// Move container state to the replacement.
    TransferState,
    /// Start the replacement.
    StartOnTarget,
    /// Remove the original from the source.
    CleanupSource,
}

impl MigrationPhase {
    /// Phases in execution order.
    pub const ALL: [Self; 5] = [
        Self::PrepareTarget,
        Self::CreateOnTarget,
        Self::TransferState,
        Self::StartOnTarget,
        Self::CleanupSource,
    ];

    /// Progress once this phase has succeeded.
    #[must_use]
    pub const fn progress_after(&self) -> f64 {
        match self {
            Self::PrepareTarget => 0.3,
            Self::CreateOnTarget => 0.5,
            Self::TransferState => 0.7,
            Self::StartOnTarget => 0.9,
            Self::CleanupSource => 1.0,
        }
    }

    /// Snake-case name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PrepareTarget => "prepare_target",
            Self::CreateOnTarget => "create_on_target",
            Self::TransferState => "transfer_state",
            Self::StartOnTarget => "start_on_target",
            Self::CleanupSource => "cleanup_source",
        }
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Progress reported when execution starts.
pub const INITIAL_PROGRESS: f64 = 0.1;

/// A request to move one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRequest {
    /// Container to move.
    pub container_id: ContainerId,
    /// Node currently owning the container.
    pub source_node_id: NodeId,
    /// Destination node.
    pub target_node_id: NodeId,
    /// Why the move is requested.
    pub reason: MigrationReason,
    /// Priority from 1 (lowest) to 10.
    pub priority: u8,
}

impl MigrationRequest {
    /// Request with the reason's default priority.
    #[must_use]
    pub fn new(
        container_id: ContainerId,
        source_node_id: impl Into<NodeId>,
        target_node_id: impl Into<NodeId>,
        reason: MigrationReason,
    ) -> Self {
        Self {
            container_id,
            source_node_id: source_node_id.into(),
            target_node_id: target_node_id.into(),
            reason,
            priority: reason.default_priority(),
        }
    }

    /// Overrides the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// Observable state of one migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStatus {
    /// Migration id.
    pub id: MigrationId,
    /// The original request.
    pub request: MigrationRequest,
    /// Lifecycle state.
    pub status: MigrationState,
    /// Fraction of phases completed, in `[0, 1]`.
    pub progress: f64,
    /// Phase currently or last executed.
    pub phase: Option<MigrationPhase>,
    /// Phase that failed.
    pub failed_phase: Option<MigrationPhase>,
    /// Failure description.
    pub error: Option<String>,
    /// Request time.
    pub requested_at: DateTime<Utc>,
    /// Execution start.
    pub start_time: Option<DateTime<Utc>>,
    /// Terminal transition time.
    pub end_time: Option<DateTime<Utc>>,
    /// Replacement container on the target.
    pub target_container_id: Option<ContainerId>,
}

impl MigrationStatus {
    pub(crate) fn pending(id: MigrationId, request: MigrationRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            request,
            status: MigrationState::Pending,
            progress: 0.0,
            phase: None,
            failed_phase: None,
            error: None,
            requested_at: now,
            start_time: None,
            end_time: None,
            target_container_id: None,
        }
    }

    /// Raises progress. Never lowers it.
    pub(crate) fn advance(&mut self, progress: f64) {
        self.progress = self.progress.max(progress.clamp(0.0, 1.0));
    }

    /// Time between execution start and completion. `None` unless completed.
    #[must_use]
    pub fn downtime(&self) -> Option<TimeDelta> {
        match (self.status, self.start_time, self.end_time) {
            (MigrationState::Completed, Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Aggregate migration figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationStats {
    /// Requests accepted.
    pub total_requested: u64,
    /// Completed migrations.
    pub completed: u64,
    /// Failed migrations.
    pub failed: u64,
    /// Cancelled migrations.
    pub cancelled: u64,
    /// Requests waiting for execution.
    pub pending: usize,
    /// Migrations currently executing.
    pub active: usize,
    /// `completed / (completed + failed)`, zero before any finished.
    pub success_rate: f64,
    /// Mean downtime over completed migrations.
    pub average_downtime_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_progress_is_increasing() {
        let mut last = INITIAL_PROGRESS;
        for phase in MigrationPhase::ALL {
            assert!(phase.progress_after() > last);
            last = phase.progress_after();
        }
        assert!((last - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reason_serde_and_priority() {
        let json = serde_json::to_string(&MigrationReason::NodeFailure).expect("serialize");
        assert_eq!(json, "\"NODE_FAILURE\"");
        assert!(
            MigrationReason::NodeFailure.default_priority()
                > MigrationReason::LoadBalancing.default_priority()
        );
    }

    #[test]
    fn test_state_terminal() {
        assert!(!MigrationState::Pending.is_terminal());
        assert!(!MigrationState::InProgress.is_terminal());
        assert!(MigrationState::Completed.is_terminal());
        assert!(MigrationState::Failed.is_terminal());
        assert!(MigrationState::Cancelled.is_terminal());
        assert_eq!(MigrationState::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn test_advance_never_lowers() {
        let request = MigrationRequest::new(
            ContainerId::generate(),
            "edge-1",
            "edge-2",
            MigrationReason::HighLoad,
        );
        let mut status = MigrationStatus::pending(MigrationId::new(), request, Utc::now());
        status.advance(0.5);
        status.advance(0.3);
        assert!((status.progress - 0.5).abs() < f64::EPSILON);
        status.advance(7.0);
        assert!((status.progress - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_migration_id_parse() {
        let id = MigrationId::new();
        let parsed: MigrationId = id.to_string().parse().expect("parse");
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<MigrationId>().is_err());
    }
}
