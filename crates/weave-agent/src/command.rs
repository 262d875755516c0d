//! Commands accepted by the fabric actor.

use tokio::sync::oneshot;
use weave_core::{Location, NodeId};
use weave_migration::{MigrationId, MigrationRequest, MigrationStats, MigrationStatus};
use weave_scheduler::{
    AssignmentAlgorithm, AssignmentStats, ClusterStatus, EdgeNodeRegistration, GapAssignment,
    Handoff, MetricsReport, MetricsUpsert, Placement, TraceStep, UserNode, UserSpec,
};

use crate::error::Result;
use crate::executor::{InvocationLease, InvocationOutcome};

/// Reply channel for one command.
pub type Reply<T> = oneshot::Sender<Result<T>>;

/// Outcome of applying a batch of trace steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceBatch {
    /// Rows applied.
    pub applied: usize,
    /// Rows rejected as malformed.
    pub rejected: usize,
}

/// Result of one auto-migration scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutoMigrationReport {
    /// Migrations executed, in execution order.
    pub executed: Vec<MigrationStatus>,
    /// Containers that needed a move but had no eligible target.
    pub stranded: usize,
}

/// Message processed by the fabric actor.
#[derive(Debug)]
pub enum FabricCommand {
    /// Register an edge node explicitly.
    RegisterEdgeNode {
        /// Node to register.
        registration: EdgeNodeRegistration,
        /// Reply channel.
        reply: Reply<()>,
    },
    /// Ingest a metrics report, registering unknown nodes.
    UpdateNodeMetrics {
        /// The report.
        report: MetricsReport,
        /// Reply channel.
        reply: Reply<MetricsUpsert>,
    },
    /// Snapshot of the fabric.
    ClusterStatus {
        /// Reply channel.
        reply: Reply<ClusterStatus>,
    },
    /// Create and place a user.
    CreateUser {
        /// User to create.
        spec: UserSpec,
        /// Reply channel.
        reply: Reply<UserNode>,
    },
    /// Move a user.
    UpdateUser {
        /// User to move.
        user_id: String,
        /// New position.
        location: Location,
        /// New request size.
        size: Option<u64>,
        /// New speed.
        speed: Option<f64>,
        /// Reply channel.
        reply: Reply<UserNode>,
    },
    /// Apply trace rows, creating users on first sight.
    ApplyTraceSteps {
        /// Rows to apply, in order.
        steps: Vec<TraceStep>,
        /// Reply channel.
        reply: Reply<TraceBatch>,
    },
    /// Remove a user.
    DeleteUser {
        /// User to remove.
        user_id: String,
        /// Reply channel.
        reply: Reply<UserNode>,
    },
    /// Evaluate a placement without creating a user.
    ScheduleUser {
        /// Position to place.
        location: Location,
        /// Request size in bytes.
        size: u64,
        /// Reply channel.
        reply: Reply<Placement>,
    },
    /// Queue a migration.
    RequestMigration {
        /// The request.
        request: MigrationRequest,
        /// Reply channel.
        reply: Reply<MigrationId>,
    },
    /// Run a pending migration to completion.
    ExecuteMigration {
        /// Migration to run.
        id: MigrationId,
        /// Reply channel.
        reply: Reply<MigrationStatus>,
    },
    /// Cancel a pending migration.
    CancelMigration {
        /// Migration to cancel.
        id: MigrationId,
        /// Reply channel.
        reply: Reply<MigrationStatus>,
    },
    /// Look up a migration.
    MigrationStatus {
        /// Migration to look up.
        id: MigrationId,
        /// Reply channel.
        reply: Reply<Option<MigrationStatus>>,
    },
    /// Aggregate migration figures.
    MigrationStats {
        /// Reply channel.
        reply: Reply<MigrationStats>,
    },
    /// Finished migrations, newest first.
    RecentMigrations {
        /// Maximum number of entries.
        count: usize,
        /// Reply channel.
        reply: Reply<Vec<MigrationStatus>>,
    },
    /// Switch the assignment algorithm.
    SetAlgorithm {
        /// New algorithm.
        algorithm: AssignmentAlgorithm,
        /// Reply channel, receiving the previous algorithm.
        reply: Reply<AssignmentAlgorithm>,
    },
    /// Current assignment algorithm.
    GetAlgorithm {
        /// Reply channel.
        reply: Reply<AssignmentAlgorithm>,
    },
    /// Toggle trace replay, which suspends the inactive-user sweep.
    SetTraceReplay {
        /// Whether a trace is being replayed.
        active: bool,
        /// Reply channel.
        reply: Reply<()>,
    },
    /// GAP assignment of every user, without applying it.
    GapPlan {
        /// Reply channel.
        reply: Reply<(Vec<GapAssignment>, AssignmentStats)>,
    },
    /// Evict edge nodes past the heartbeat timeout.
    SweepDeadNodes {
        /// Reply channel.
        reply: Reply<Vec<NodeId>>,
    },
    /// Reap expired warm containers.
    ReapContainers {
        /// Reply channel.
        reply: Reply<usize>,
    },
    /// Run the reassignment scan.
    ReassignUsers {
        /// Reply channel.
        reply: Reply<Vec<Handoff>>,
    },
    /// Remove users past the TTL.
    SweepInactiveUsers {
        /// Reply channel.
        reply: Reply<Vec<String>>,
    },
    /// Check out a container for every user.
    LeaseInvocations {
        /// Function to invoke.
        function: String,
        /// Image for newly created containers.
        image: String,
        /// Reply channel.
        reply: Reply<Vec<InvocationLease>>,
    },
    /// Settle a finished invocation.
    CompleteInvocation {
        /// The outcome.
        outcome: InvocationOutcome,
        /// Reply channel.
        reply: Reply<()>,
    },
    /// Move containers off overloaded or unhealthy nodes.
    AutoMigrate {
        /// Reply channel.
        reply: Reply<AutoMigrationReport>,
    },
}
