//! Caller-side API of the fabric.

use tokio::sync::{mpsc, oneshot};
use weave_core::{Location, NodeId};
use weave_migration::{MigrationId, MigrationRequest, MigrationStats, MigrationStatus};
use weave_scheduler::{
    AssignmentAlgorithm, AssignmentStats, ClusterStatus, EdgeNodeRegistration, GapAssignment,
    Handoff, MetricsReport, MetricsUpsert, Placement, TraceStep, UserNode, UserSpec,
};

use crate::command::{AutoMigrationReport, FabricCommand, Reply, TraceBatch};
use crate::error::{FabricError, Result};
use crate::executor::{InvocationLease, InvocationOutcome};

/// Cloneable handle to a running [`crate::FabricActor`].
///
/// Every method posts one command and waits for its reply. Once the actor
/// has stopped, every call fails with [`FabricError::ActorUnavailable`].
#[derive(Debug, Clone)]
pub struct FabricHandle {
    tx: mpsc::Sender<FabricCommand>,
}

impl FabricHandle {
    pub(crate) const fn new(tx: mpsc::Sender<FabricCommand>) -> Self {
        Self { tx }
    }

    /// Whether the actor has stopped receiving commands.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> FabricCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| FabricError::ActorUnavailable)?;
        rx.await.map_err(|_| FabricError::ActorUnavailable)?
    }

    // ---- nodes ----

    /// Registers an edge node.
    ///
    /// # Errors
    ///
    /// Fails for malformed registrations and live duplicate ids.
    pub async fn register_edge_node(&self, registration: EdgeNodeRegistration) -> Result<()> {
        self.request(|reply| FabricCommand::RegisterEdgeNode {
            registration,
            reply,
        })
        .await
    }

    /// Ingests a metrics report, registering the node if it is unknown.
    pub async fn update_node_metrics(&self, report: MetricsReport) -> Result<MetricsUpsert> {
        self.request(|reply| FabricCommand::UpdateNodeMetrics { report, reply })
            .await
    }

    /// Snapshot of nodes, users and health.
    pub async fn cluster_status(&self) -> Result<ClusterStatus> {
        self.request(|reply| FabricCommand::ClusterStatus { reply })
            .await
    }

    // ---- users ----

    /// Creates and places a user.
    pub async fn create_user(&self, spec: UserSpec) -> Result<UserNode> {
        self.request(|reply| FabricCommand::CreateUser { spec, reply })
            .await
    }

    /// Moves a user. The assignment follows on the next reassignment scan.
    pub async fn update_user(
        &self,
        user_id: impl Into<String>,
        location: Location,
        size: Option<u64>,
        speed: Option<f64>,
    ) -> Result<UserNode> {
        let user_id = user_id.into();
        self.request(|reply| FabricCommand::UpdateUser {
            user_id,
            location,
            size,
            speed,
            reply,
        })
        .await
    }

    /// Applies trace rows in order.
    pub async fn apply_trace_steps(&self, steps: Vec<TraceStep>) -> Result<TraceBatch> {
        self.request(|reply| FabricCommand::ApplyTraceSteps { steps, reply })
            .await
    }

    /// Removes a user.
    pub async fn delete_user(&self, user_id: impl Into<String>) -> Result<UserNode> {
        let user_id = user_id.into();
        self.request(|reply| FabricCommand::DeleteUser { user_id, reply })
            .await
    }

    /// Placement the current algorithm would choose for a position.
    pub async fn schedule_user(&self, location: Location, size: u64) -> Result<Placement> {
        self.request(|reply| FabricCommand::ScheduleUser {
            location,
            size,
            reply,
        })
        .await
    }

    // ---- scheduling ----

    /// Switches the assignment algorithm and returns the previous one.
    pub async fn set_assignment_algorithm(
        &self,
        algorithm: AssignmentAlgorithm,
    ) -> Result<AssignmentAlgorithm> {
        self.request(|reply| FabricCommand::SetAlgorithm { algorithm, reply })
            .await
    }

    /// Current assignment algorithm.
    pub async fn assignment_algorithm(&self) -> Result<AssignmentAlgorithm> {
        self.request(|reply| FabricCommand::GetAlgorithm { reply })
            .await
    }

    /// Marks a trace replay as running or finished.
    pub async fn set_trace_replay(&self, active: bool) -> Result<()> {
        self.request(|reply| FabricCommand::SetTraceReplay { active, reply })
            .await
    }

    /// GAP assignment of every user with aggregate figures. Nothing is
    /// applied.
    pub async fn gap_plan(&self) -> Result<(Vec<GapAssignment>, AssignmentStats)> {
        self.request(|reply| FabricCommand::GapPlan { reply }).await
    }

    // ---- migrations ----

    /// Queues a migration.
    pub async fn request_migration(&self, request: MigrationRequest) -> Result<MigrationId> {
        self.request(|reply| FabricCommand::RequestMigration { request, reply })
            .await
    }

    /// Runs a pending migration. Phase failures come back as a `failed`
    /// status, not as an error.
    pub async fn execute_migration(&self, id: MigrationId) -> Result<MigrationStatus> {
        self.request(|reply| FabricCommand::ExecuteMigration { id, reply })
            .await
    }

    /// Cancels a pending migration.
    pub async fn cancel_migration(&self, id: MigrationId) -> Result<MigrationStatus> {
        self.request(|reply| FabricCommand::CancelMigration { id, reply })
            .await
    }

    /// Status of any migration still pending, active or in the history.
    pub async fn migration_status(&self, id: MigrationId) -> Result<Option<MigrationStatus>> {
        self.request(|reply| FabricCommand::MigrationStatus { id, reply })
            .await
    }

    /// Aggregate migration figures.
    pub async fn migration_stats(&self) -> Result<MigrationStats> {
        self.request(|reply| FabricCommand::MigrationStats { reply })
            .await
    }

    /// Up to `count` finished migrations, newest first.
    pub async fn recent_migrations(&self, count: usize) -> Result<Vec<MigrationStatus>> {
        self.request(|reply| FabricCommand::RecentMigrations { count, reply })
            .await
    }

    // ---- agent commands ----

    pub(crate) async fn sweep_dead_nodes(&self) -> Result<Vec<NodeId>> {
        self.request(|reply| FabricCommand::SweepDeadNodes { reply })
            .await
    }

    pub(crate) async fn reap_containers(&self) -> Result<usize> {
        self.request(|reply| FabricCommand::ReapContainers { reply })
            .await
    }

    pub(crate) async fn reassign_users(&self) -> Result<Vec<Handoff>> {
        self.request(|reply| FabricCommand::ReassignUsers { reply })
            .await
    }

    pub(crate) async fn sweep_inactive_users(&self) -> Result<Vec<String>> {
        self.request(|reply| FabricCommand::SweepInactiveUsers { reply })
            .await
    }

    pub(crate) async fn lease_invocations(
        &self,
        function: &str,
        image: &str,
    ) -> Result<Vec<InvocationLease>> {
        let function = function.to_string();
        let image = image.to_string();
        self.request(|reply| FabricCommand::LeaseInvocations {
            function,
            image,
            reply,
        })
        .await
    }

    pub(crate) async fn complete_invocation(&self, outcome: InvocationOutcome) -> Result<()> {
        self.request(|reply| FabricCommand::CompleteInvocation { outcome, reply })
            .await
    }

    pub(crate) async fn auto_migrate(&self) -> Result<AutoMigrationReport> {
        self.request(|reply| FabricCommand::AutoMigrate { reply })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_calls_fail_once_actor_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = FabricHandle::new(tx);
        assert!(handle.is_closed());

        let err = handle.cluster_status().await.expect_err("actor gone");
        assert!(matches!(err, FabricError::ActorUnavailable));
    }

    #[tokio::test]
    async fn test_dropped_reply_is_unavailable() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = FabricHandle::new(tx);

        let call = tokio::spawn(async move { handle.assignment_algorithm().await });
        // Receive the command and drop it without replying.
        let command = rx.recv().await.expect("command");
        assert!(matches!(command, FabricCommand::GetAlgorithm { .. }));
        drop(command);

        let err = call.await.expect("join").expect_err("no reply");
        assert!(matches!(err, FabricError::ActorUnavailable));
    }
}
