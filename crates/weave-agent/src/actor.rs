//! The fabric actor.
//!
//! [`FabricActor`] is the single owner of the node registry, the container
//! fleet and the migration manager. Every mutation arrives as a
//! [`FabricCommand`] over a bounded channel and is applied to completion
//! before the next command is read, so sweeps never race with deletions and
//! no state is shared behind locks.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use weave_container::{ContainerFleet, ContainerRuntime, ContainerState};
use weave_core::{HealthStatus, Location, NodeId};
use weave_migration::{
    FleetBackend, MigrationError, MigrationId, MigrationManager, MigrationRequest, MigrationStats,
    MigrationStatus,
};
use weave_scheduler::{
    AssignmentAlgorithm, AssignmentStats, EdgeNodeRegistration, GapAssignment, LoadPredictor,
    MetricsReport, MetricsUpsert, NodeRegistry, Placement, SchedulerError, TraceStep, UserNode,
    UserSpec, assignment_stats,
};

use crate::command::{AutoMigrationReport, FabricCommand, TraceBatch};
use crate::config::FabricConfig;
use crate::error::Result;
use crate::executor::{InvocationLease, InvocationOutcome};
use crate::handle::FabricHandle;

/// Single owner of all fabric state.
#[derive(Debug)]
pub struct FabricActor {
    registry: NodeRegistry,
    fleet: ContainerFleet,
    migrations: MigrationManager,
    trace_replay: bool,
    commands: mpsc::Receiver<FabricCommand>,
}

impl FabricActor {
    /// Creates an actor and the handle that feeds it.
    ///
    /// Without a runtime every container operation fails with
    /// [`weave_container::ContainerError::RuntimeUnavailable`]; scheduling
    /// still works.
    #[must_use]
    pub fn new(
        config: &FabricConfig,
        runtime: Option<Arc<dyn ContainerRuntime>>,
    ) -> (Self, FabricHandle) {
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let actor = Self {
            registry: NodeRegistry::new(config.scheduler.clone()),
            fleet: ContainerFleet::new(runtime, config.lifecycle.clone()),
            migrations: MigrationManager::new(config.migration.clone()),
            trace_replay: false,
            commands: rx,
        };
        (actor, FabricHandle::new(tx))
    }

    /// Attaches a load predictor for the predictive strategy.
    #[must_use]
    pub fn with_predictor(mut self, predictor: Arc<dyn LoadPredictor>) -> Self {
        self.registry.set_predictor(Some(predictor));
        self
    }

    /// Runs the actor on a new task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Processes commands until every handle is dropped.
    pub async fn run(mut self) {
        info!(
            algorithm = %self.registry.algorithm(),
            central = %self.registry.central().location,
            "fabric actor started"
        );
        while let Some(command) = self.commands.recv().await {
            self.handle(command).await;
        }
        info!("fabric actor stopped");
    }

    async fn handle(&mut self, command: FabricCommand) {
        let now = Utc::now();
        match command {
            FabricCommand::RegisterEdgeNode {
                registration,
                reply,
            } => {
                let _ = reply.send(self.register_edge_node(registration, now));
            }
            FabricCommand::UpdateNodeMetrics { report, reply } => {
                let _ = reply.send(self.update_node_metrics(report, now));
            }
            FabricCommand::ClusterStatus { reply } => {
                let _ = reply.send(Ok(self.registry.cluster_status_at(now)));
            }
            FabricCommand::CreateUser { spec, reply } => {
                let _ = reply.send(self.create_user(spec, now));
            }
            FabricCommand::UpdateUser {
                user_id,
                location,
                size,
                speed,
                reply,
            } => {
                let _ = reply.send(self.update_user(&user_id, location, size, speed, now));
            }
            FabricCommand::ApplyTraceSteps { steps, reply } => {
                let _ = reply.send(Ok(self.apply_trace_steps(&steps, now)));
            }
            FabricCommand::DeleteUser { user_id, reply } => {
                let _ = reply.send(self.registry.delete_user(&user_id).map_err(Into::into));
            }
            FabricCommand::ScheduleUser {
                location,
                size,
                reply,
            } => {
                let _ = reply.send(self.schedule_user(&location, size));
            }
            FabricCommand::RequestMigration { request, reply } => {
                let _ = reply.send(self.request_migration(request, now));
            }
            FabricCommand::ExecuteMigration { id, reply } => {
                let _ = reply.send(self.execute_migration(id).await);
            }
            FabricCommand::CancelMigration { id, reply } => {
                let _ = reply.send(self.migrations.cancel(id).map_err(Into::into));
            }
            FabricCommand::MigrationStatus { id, reply } => {
                let _ = reply.send(Ok(self.migrations.status(id)));
            }
            FabricCommand::MigrationStats { reply } => {
                let _ = reply.send(Ok(self.migration_stats()));
            }
            FabricCommand::RecentMigrations { count, reply } => {
                let _ = reply.send(Ok(self.migrations.history().list_recent(count)));
            }
            FabricCommand::SetAlgorithm { algorithm, reply } => {
                let _ = reply.send(Ok(self.set_algorithm(algorithm)));
            }
            FabricCommand::GetAlgorithm { reply } => {
                let _ = reply.send(Ok(self.registry.algorithm()));
            }
            FabricCommand::SetTraceReplay { active, reply } => {
                self.set_trace_replay(active);
                let _ = reply.send(Ok(()));
            }
            FabricCommand::GapPlan { reply } => {
                let _ = reply.send(self.gap_plan());
            }
            FabricCommand::SweepDeadNodes { reply } => {
                let _ = reply.send(Ok(self.sweep_dead_nodes(now).await));
            }
            FabricCommand::ReapContainers { reply } => {
                let _ = reply.send(Ok(self.reap_containers(now).await));
            }
            FabricCommand::ReassignUsers { reply } => {
                let _ = reply.send(Ok(self.registry.reassign_all_at(now)));
            }
            FabricCommand::SweepInactiveUsers { reply } => {
                let _ = reply.send(Ok(self.sweep_inactive_users(now)));
            }
            FabricCommand::LeaseInvocations {
                function,
                image,
                reply,
            } => {
                let _ = reply.send(Ok(self.lease_invocations(&function, &image, now).await));
            }
            FabricCommand::CompleteInvocation { outcome, reply } => {
                self.complete_invocation(&outcome, now).await;
                let _ = reply.send(Ok(()));
            }
            FabricCommand::AutoMigrate { reply } => {
                let _ = reply.send(Ok(self.auto_migrate(now).await));
            }
        }
    }

    // ---- nodes ----

    fn register_edge_node(
        &mut self,
        registration: EdgeNodeRegistration,
        now: DateTime<Utc>,
    ) -> Result<()> {
        Ok(self.registry.register_edge_node_at(registration, now)?)
    }

    fn update_node_metrics(
        &mut self,
        report: MetricsReport,
        now: DateTime<Utc>,
    ) -> Result<MetricsUpsert> {
        let node_id = report.node_id.clone();
        let upsert = self.registry.update_node_metrics_at(report, now)?;
        if upsert == MetricsUpsert::Registered {
            self.sync_counts(&node_id);
        }
        Ok(upsert)
    }

    async fn sweep_dead_nodes(&mut self, now: DateTime<Utc>) -> Vec<NodeId> {
        let evicted = self.registry.sweep_dead_nodes_at(now);
        for node_id in &evicted {
            let drained = self.fleet.decommission(node_id).await;
            debug!(node = %node_id, containers = drained.len(), "dead node drained");
        }
        evicted
    }

    fn sync_counts(&mut self, node_id: &str) {
        let counts = self.fleet.counts(node_id);
        self.registry
            .sync_container_counts(node_id, counts.running, counts.warm);
    }

    // ---- users ----

    fn create_user(&mut self, spec: UserSpec, now: DateTime<Utc>) -> Result<UserNode> {
        Ok(self.registry.create_user_at(spec, now)?)
    }

    fn update_user(
        &mut self,
        user_id: &str,
        location: Location,
        size: Option<u64>,
        speed: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<UserNode> {
        Ok(self
            .registry
            .update_user_at(user_id, location, size, speed, now)?)
    }

    fn apply_trace_steps(&mut self, steps: &[TraceStep], now: DateTime<Utc>) -> TraceBatch {
        let mut batch = TraceBatch::default();
        for step in steps {
            match self.registry.upsert_trace_position_at(step, now) {
                Ok(_) => batch.applied += 1,
                Err(e) => {
                    warn!(user = %step.user_id, timestep = step.timestep, error = %e, "trace row rejected");
                    batch.rejected += 1;
                }
            }
        }
        batch
    }

    fn schedule_user(&self, location: &Location, size: u64) -> Result<Placement> {
        Ok(self.registry.schedule_user(location, size)?)
    }

    fn sweep_inactive_users(&mut self, now: DateTime<Utc>) -> Vec<String> {
        if self.trace_replay {
            debug!("inactive-user sweep suspended during trace replay");
            return Vec::new();
        }
        self.registry.sweep_inactive_users_at(now)
    }

    fn set_trace_replay(&mut self, active: bool) {
        if self.trace_replay != active {
            info!(active, "trace replay toggled");
        }
        self.trace_replay = active;
    }

    // ---- scheduling ----

    fn set_algorithm(&mut self, algorithm: AssignmentAlgorithm) -> AssignmentAlgorithm {
        self.registry.set_algorithm(algorithm)
    }

    fn gap_plan(&self) -> Result<(Vec<GapAssignment>, AssignmentStats)> {
        let plan = self.registry.gap_plan()?;
        let stats = assignment_stats(&plan);
        Ok((plan, stats))
    }

    // ---- containers ----

    async fn reap_containers(&mut self, now: DateTime<Utc>) -> usize {
        let reaped = self.fleet.reap_at(now).await;
        let touched: BTreeSet<NodeId> = reaped.iter().map(|(node, _)| node.clone()).collect();
        for node_id in &touched {
            self.sync_counts(node_id);
        }
        reaped.len()
    }

    async fn lease_invocations(
        &mut self,
        function: &str,
        image: &str,
        now: DateTime<Utc>,
    ) -> Vec<InvocationLease> {
        let targets: Vec<(String, NodeId)> = self
            .registry
            .users()
            .map(|u| (u.id.clone(), u.assigned_node_id.clone()))
            .collect();

        let mut leases = Vec::with_capacity(targets.len());
        let mut touched = BTreeSet::new();
        for (user_id, node_id) in targets {
            match self
                .fleet
                .manager_mut(&node_id)
                .get_or_create_at(function, image, now)
                .await
            {
                Ok(acquired) => leases.push(InvocationLease {
                    user_id,
                    node_id: node_id.clone(),
                    container_id: acquired.container_id,
                    start: acquired.start,
                    function: function.to_string(),
                    issued_at: now,
                }),
                Err(e) => warn!(user = %user_id, node = %node_id, error = %e, "invocation lease failed"),
            }
            touched.insert(node_id);
        }
        for node_id in &touched {
            self.sync_counts(node_id);
        }
        debug!(leases = leases.len(), "invocations leased");
        leases
    }

    async fn complete_invocation(&mut self, outcome: &InvocationOutcome, now: DateTime<Utc>) {
        let lease = &outcome.lease;
        let owner = self
            .fleet
            .locate(&lease.container_id)
            .map(|(node, _)| node.to_string());

        match owner {
            Some(node_id) => {
                if let Err(e) = self
                    .fleet
                    .manager_mut(&node_id)
                    .mark_warm_at(&lease.container_id, now)
                    .await
                {
                    warn!(container = %lease.container_id, error = %e, "could not park container");
                }
                self.sync_counts(&node_id);
            }
            None => debug!(container = %lease.container_id, "leased container is gone"),
        }

        if !outcome.succeeded {
            warn!(user = %lease.user_id, node = %lease.node_id, "invocation failed");
            return;
        }
        match self.registry.record_execution_at(
            &lease.user_id,
            &lease.node_id,
            outcome.computation_ms,
            lease.start,
            now,
        ) {
            Ok(()) => {}
            Err(SchedulerError::NotFound { .. }) => {
                debug!(user = %lease.user_id, "execution finished for departed user");
            }
            Err(e) => warn!(user = %lease.user_id, error = %e, "execution not recorded"),
        }
    }

    // ---- migrations ----

    fn request_migration(
        &mut self,
        request: MigrationRequest,
        now: DateTime<Utc>,
    ) -> Result<MigrationId> {
        for node_id in [&request.source_node_id, &request.target_node_id] {
            if !node_id.trim().is_empty() && self.registry.node(node_id).is_none() {
                return Err(SchedulerError::node_not_found(node_id.as_str()).into());
            }
        }
        let leased = self
            .fleet
            .manager(&request.source_node_id)
            .and_then(|m| m.get(&request.container_id))
            .is_some_and(|c| c.state == ContainerState::Running);
        if leased {
            return Err(MigrationError::ContainerBusy(request.container_id).into());
        }
        Ok(self.migrations.request_at(request, now)?)
    }

    async fn execute_migration(&mut self, id: MigrationId) -> Result<MigrationStatus> {
        let status = self
            .migrations
            .execute(id, &mut FleetBackend::new(&mut self.fleet))
            .await?;
        self.sync_counts(&status.request.source_node_id);
        self.sync_counts(&status.request.target_node_id);
        Ok(status)
    }

    fn migration_stats(&self) -> MigrationStats {
        self.migrations.stats()
    }

    /// Least-loaded healthy node other than `source`.
    fn migration_target(&self, source: &str) -> Option<NodeId> {
        std::iter::once(self.registry.central())
            .chain(self.registry.edges())
            .filter(|n| n.id != source)
            .filter(|n| self.registry.health_of(n) == HealthStatus::Healthy)
            .min_by(|a, b| {
                a.metrics
                    .cpu_percent
                    .total_cmp(&b.metrics.cpu_percent)
                    .then(a.metrics.memory_percent.total_cmp(&b.metrics.memory_percent))
            })
            .map(|n| n.id.clone())
    }

    async fn auto_migrate(&mut self, now: DateTime<Utc>) -> AutoMigrationReport {
        let mut candidates = Vec::new();
        for node_id in self.fleet.active_nodes() {
            let (Some(node), Some(manager)) =
                (self.registry.node(&node_id), self.fleet.manager(&node_id))
            else {
                continue;
            };
            let health = self.registry.health_of(node);
            for container in manager.list() {
                // Running containers belong to an outstanding lease.
                if container.state == ContainerState::Running
                    || self.migrations.is_busy(&container.id)
                {
                    continue;
                }
                if let Some(reason) =
                    self.migrations
                        .should_migrate(container, &node.metrics, health)
                {
                    candidates.push((node_id.clone(), container.id.clone(), reason));
                }
            }
        }

        let mut report = AutoMigrationReport::default();
        for (source, container_id, reason) in candidates {
            let Some(target) = self.migration_target(&source) else {
                warn!(node = %source, container = %container_id, %reason, "no healthy migration target");
                report.stranded += 1;
                continue;
            };
            let request = MigrationRequest::new(container_id, source, target, reason);
            let id = match self.migrations.request_at(request, now) {
                Ok(id) => id,
                Err(e) => {
                    warn!(error = %e, "auto-migration request rejected");
                    continue;
                }
            };
            match self.execute_migration(id).await {
                Ok(status) => report.executed.push(status),
                Err(e) => warn!(migration = %id, error = %e, "auto-migration failed to run"),
            }
        }
        if !report.executed.is_empty() {
            info!(
                executed = report.executed.len(),
                stranded = report.stranded,
                "auto-migration scan finished"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use weave_container::{ContainerError, SimulatedRuntime};
    use weave_core::{CENTRAL_NODE_ID, ContainerStartKind, NodeMetrics};
    use weave_migration::{MigrationReason, MigrationState};

    use super::*;
    use crate::error::FabricError;

    fn actor() -> FabricActor {
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(SimulatedRuntime::new());
        let (actor, _handle) = FabricActor::new(&FabricConfig::default(), Some(runtime));
        actor
    }

    fn register(actor: &mut FabricActor, id: &str, x: f64, y: f64, now: DateTime<Utc>) {
        actor
            .register_edge_node(
                EdgeNodeRegistration::new(id, Location::new(x, y)).with_coverage(300.0),
                now,
            )
            .expect("register");
    }

    fn report_usage(actor: &mut FabricActor, id: &str, cpu: f64, now: DateTime<Utc>) {
        actor
            .update_node_metrics(MetricsReport::new(id, NodeMetrics::with_usage(cpu, 10.0)), now)
            .expect("metrics");
    }

    fn outcome(lease: InvocationLease, computation_ms: f64) -> InvocationOutcome {
        InvocationOutcome {
            lease,
            computation_ms,
            succeeded: true,
        }
    }

    /// Edge node `edge-1` at the origin serving one warm container for `u1`.
    async fn warm_edge(now: DateTime<Utc>) -> FabricActor {
        let mut actor = actor();
        register(&mut actor, "edge-1", 0.0, 0.0, now);
        actor
            .create_user(UserSpec::new("u1", Location::new(50.0, 50.0)), now)
            .expect("user");
        let leases = actor.lease_invocations("echo", "img", now).await;
        assert_eq!(leases.len(), 1);
        let lease = leases.into_iter().next().expect("lease");
        actor.complete_invocation(&outcome(lease, 120.0), now).await;
        actor
    }

    fn edge_metrics<'a>(actor: &'a FabricActor, id: &str) -> &'a NodeMetrics {
        &actor.registry.node(id).expect("node").metrics
    }

    #[tokio::test]
    async fn test_lease_then_complete_parks_container() {
        let t0 = Utc::now();
        let mut actor = actor();
        register(&mut actor, "edge-1", 0.0, 0.0, t0);
        actor
            .create_user(UserSpec::new("u1", Location::new(50.0, 50.0)), t0)
            .expect("user");

        let leases = actor.lease_invocations("echo", "img", t0).await;
        assert_eq!(leases.len(), 1);
        let lease = leases[0].clone();
        assert_eq!(lease.node_id, "edge-1");
        assert_eq!(lease.start, ContainerStartKind::Cold);
        assert_eq!(edge_metrics(&actor, "edge-1").running_containers, 1);

        actor.complete_invocation(&outcome(lease.clone(), 120.0), t0).await;
        let metrics = edge_metrics(&actor, "edge-1");
        assert_eq!(metrics.running_containers, 0);
        assert_eq!(metrics.warm_containers, 1);
        assert!((metrics.avg_response_time_ms - 120.0).abs() < 1e-9);

        let user = actor.registry.user("u1").expect("user");
        assert_eq!(user.latency.container_start, ContainerStartKind::Cold);
        assert!(user.last_executed.is_some());

        let again = actor
            .lease_invocations("echo", "img", t0 + TimeDelta::seconds(2))
            .await;
        assert_eq!(again[0].start, ContainerStartKind::Warm);
        assert_eq!(again[0].container_id, lease.container_id);
    }

    #[tokio::test]
    async fn test_completion_for_departed_user_still_parks_container() {
        let t0 = Utc::now();
        let mut actor = actor();
        register(&mut actor, "edge-1", 0.0, 0.0, t0);
        actor
            .create_user(UserSpec::new("u1", Location::new(50.0, 50.0)), t0)
            .expect("user");
        let lease = actor.lease_invocations("echo", "img", t0).await.remove(0);
        actor.registry.delete_user("u1").expect("delete");

        actor.complete_invocation(&outcome(lease, 80.0), t0).await;
        assert_eq!(edge_metrics(&actor, "edge-1").warm_containers, 1);
    }

    #[tokio::test]
    async fn test_reaper_updates_node_counts() {
        let t0 = Utc::now();
        let mut actor = warm_edge(t0).await;
        assert_eq!(actor.reap_containers(t0 + TimeDelta::seconds(3)).await, 0);
        assert_eq!(actor.reap_containers(t0 + TimeDelta::seconds(6)).await, 1);
        assert_eq!(edge_metrics(&actor, "edge-1").warm_containers, 0);
    }

    #[tokio::test]
    async fn test_dead_node_sweep_drains_containers_and_rehomes_users() {
        let t0 = Utc::now();
        let mut actor = warm_edge(t0).await;

        assert!(actor.sweep_dead_nodes(t0 + TimeDelta::seconds(9)).await.is_empty());
        let evicted = actor.sweep_dead_nodes(t0 + TimeDelta::seconds(11)).await;
        assert_eq!(evicted, vec!["edge-1".to_string()]);
        assert!(actor.fleet.manager("edge-1").is_none());
        assert_eq!(
            actor.registry.user("u1").expect("user").assigned_node_id,
            CENTRAL_NODE_ID
        );
    }

    #[tokio::test]
    async fn test_trace_replay_suspends_user_sweep() {
        let t0 = Utc::now();
        let mut actor = actor();
        actor
            .create_user(UserSpec::new("u1", Location::new(1.0, 1.0)), t0)
            .expect("user");

        actor.set_trace_replay(true);
        assert!(actor.sweep_inactive_users(t0 + TimeDelta::seconds(3)).is_empty());
        actor.set_trace_replay(false);
        assert_eq!(
            actor.sweep_inactive_users(t0 + TimeDelta::seconds(3)),
            vec!["u1".to_string()]
        );
    }

    #[test]
    fn test_trace_batch_counts_rejections() {
        let t0 = Utc::now();
        let mut actor = actor();
        let row = |user: &str, x: f64| TraceStep {
            user_id: user.to_string(),
            x,
            y: 10.0,
            size: 1_000,
            speed: 1.0,
            timestep: 0,
        };
        let batch = actor.apply_trace_steps(&[row("a", 1.0), row("b", f64::NAN), row("a", 2.0)], t0);
        assert_eq!(batch, TraceBatch { applied: 2, rejected: 1 });
        assert!(actor.registry.user("a").expect("user").trace_driven);
        assert!(actor.registry.user("b").is_none());
    }

    #[tokio::test]
    async fn test_auto_migrate_moves_warm_containers_off_hot_node() {
        let t0 = Utc::now();
        let mut actor = warm_edge(t0).await;
        register(&mut actor, "edge-2", 900.0, 700.0, t0);
        report_usage(&mut actor, "edge-1", 95.0, t0);
        report_usage(&mut actor, "edge-2", 20.0, t0);
        report_usage(&mut actor, CENTRAL_NODE_ID, 40.0, t0);

        let report = actor.auto_migrate(t0).await;
        assert_eq!(report.stranded, 0);
        assert_eq!(report.executed.len(), 1);
        let status = &report.executed[0];
        assert_eq!(status.status, MigrationState::Completed);
        assert_eq!(status.request.reason, MigrationReason::HighLoad);
        assert_eq!(status.request.target_node_id, "edge-2");
        assert_eq!(status.request.priority, MigrationReason::HighLoad.default_priority());

        assert_eq!(edge_metrics(&actor, "edge-1").warm_containers, 0);
        assert_eq!(edge_metrics(&actor, "edge-2").warm_containers, 1);
        assert_eq!(actor.migration_stats().completed, 1);
    }

    #[tokio::test]
    async fn test_auto_migrate_leaves_running_containers() {
        let t0 = Utc::now();
        let mut actor = actor();
        register(&mut actor, "edge-1", 0.0, 0.0, t0);
        actor
            .create_user(UserSpec::new("u1", Location::new(50.0, 50.0)), t0)
            .expect("user");
        let _leases = actor.lease_invocations("echo", "img", t0).await;
        report_usage(&mut actor, "edge-1", 95.0, t0);

        let report = actor.auto_migrate(t0).await;
        assert!(report.executed.is_empty());
        assert_eq!(report.stranded, 0);
    }

    #[tokio::test]
    async fn test_request_migration_refuses_leased_container() {
        let t0 = Utc::now();
        let mut actor = actor();
        register(&mut actor, "edge-1", 0.0, 0.0, t0);
        actor
            .create_user(UserSpec::new("u1", Location::new(50.0, 50.0)), t0)
            .expect("user");
        let lease = actor
            .lease_invocations("echo", "img", t0)
            .await
            .into_iter()
            .next()
            .expect("lease");
        let request = || {
            MigrationRequest::new(
                lease.container_id.clone(),
                "edge-1",
                CENTRAL_NODE_ID,
                MigrationReason::LoadBalancing,
            )
        };

        let err = actor.request_migration(request(), t0).expect_err("leased");
        assert!(matches!(
            err,
            FabricError::Migration(MigrationError::ContainerBusy(_))
        ));

        actor.complete_invocation(&outcome(lease.clone(), 80.0), t0).await;
        let id = actor.request_migration(request(), t0).expect("parked");
        let status = actor.execute_migration(id).await.expect("execute");
        assert_eq!(status.status, MigrationState::Completed);

        let central = edge_metrics(&actor, CENTRAL_NODE_ID);
        assert_eq!(central.running_containers, 0);
        assert_eq!(central.warm_containers, 1);
    }

    #[tokio::test]
    async fn test_lease_between_request_and_execute_fails_migration() {
        let t0 = Utc::now();
        let mut actor = warm_edge(t0).await;
        let container_id = actor
            .fleet
            .manager("edge-1")
            .and_then(|m| m.list().first().map(|c| c.id.clone()))
            .expect("container");
        let id = actor
            .request_migration(
                MigrationRequest::new(container_id.clone(), "edge-1", CENTRAL_NODE_ID, MigrationReason::HighLoad),
                t0,
            )
            .expect("request");

        let lease = actor
            .lease_invocations("echo", "img", t0)
            .await
            .into_iter()
            .next()
            .expect("lease");
        assert_eq!(lease.container_id, container_id);

        let status = actor.execute_migration(id).await.expect("execute");
        assert_eq!(status.status, MigrationState::Failed);
        assert_eq!(
            status.failed_phase,
            Some(weave_migration::MigrationPhase::PrepareTarget)
        );

        actor.complete_invocation(&outcome(lease, 80.0), t0).await;
        assert_eq!(edge_metrics(&actor, "edge-1").warm_containers, 1);
        let central = edge_metrics(&actor, CENTRAL_NODE_ID);
        assert_eq!(central.running_containers, 0);
        assert_eq!(central.warm_containers, 0);
    }

    #[tokio::test]
    async fn test_auto_migrate_without_healthy_target() {
        let t0 = Utc::now();
        let mut actor = warm_edge(t0).await;
        report_usage(&mut actor, "edge-1", 95.0, t0);
        report_usage(&mut actor, CENTRAL_NODE_ID, 75.0, t0);

        let report = actor.auto_migrate(t0).await;
        assert!(report.executed.is_empty());
        assert_eq!(report.stranded, 1);
    }

    #[tokio::test]
    async fn test_request_migration_requires_known_nodes() {
        let t0 = Utc::now();
        let mut actor = warm_edge(t0).await;
        let container_id = actor
            .fleet
            .manager("edge-1")
            .and_then(|m| m.list().first().map(|c| c.id.clone()))
            .expect("container");

        let err = actor
            .request_migration(
                MigrationRequest::new(container_id.clone(), "edge-1", "edge-9", MigrationReason::LoadBalancing),
                t0,
            )
            .expect_err("unknown target");
        assert!(matches!(err, FabricError::Scheduler(SchedulerError::NotFound { .. })));

        let id = actor
            .request_migration(
                MigrationRequest::new(container_id, "edge-1", CENTRAL_NODE_ID, MigrationReason::LoadBalancing),
                t0,
            )
            .expect("request");
        let status = actor.execute_migration(id).await.expect("execute");
        assert_eq!(status.status, MigrationState::Completed);
        assert_eq!(edge_metrics(&actor, CENTRAL_NODE_ID).warm_containers, 1);
    }

    #[tokio::test]
    async fn test_leases_fail_without_runtime() {
        let t0 = Utc::now();
        let (mut actor, _handle) = FabricActor::new(&FabricConfig::default(), None);
        actor
            .create_user(UserSpec::new("u1", Location::new(1.0, 1.0)), t0)
            .expect("user");
        assert!(actor.lease_invocations("echo", "img", t0).await.is_empty());

        let err = actor
            .fleet
            .manager_mut(CENTRAL_NODE_ID)
            .ping()
            .await
            .expect_err("no runtime");
        assert!(matches!(err, ContainerError::RuntimeUnavailable(_)));
    }

    #[test]
    fn test_gap_plan_reports_stats() {
        let t0 = Utc::now();
        let mut actor = actor();
        register(&mut actor, "edge-1", 0.0, 0.0, t0);
        for (id, x) in [("u1", 10.0), ("u2", 20.0)] {
            actor
                .create_user(UserSpec::new(id, Location::new(x, x)).with_size(1_000_000), t0)
                .expect("user");
        }
        let (plan, stats) = actor.gap_plan().expect("plan");
        assert_eq!(plan.len(), 2);
        assert_eq!(stats.users, 2);
        assert_eq!(stats.edge_count + stats.central_count + stats.cloud_count, 2);
    }

    #[test]
    fn test_set_algorithm_returns_previous() {
        let mut actor = actor();
        assert_eq!(actor.set_algorithm(AssignmentAlgorithm::Gap), AssignmentAlgorithm::Greedy);
        assert_eq!(actor.registry.algorithm(), AssignmentAlgorithm::Gap);
    }
}
