//! End-to-end tests of the fabric through its handle.

use std::sync::Arc;
use std::time::Duration;

use weave_agent::{
    AgentSet, ExecutionDriver, FabricConfig, FabricError, FabricHandle, SimulatedExecutor,
    Simulation, TraceFeed, TraceReplay, spawn_fabric,
};
use weave_container::{ContainerId, ContainerRuntime, SimulatedRuntime};
use weave_core::{CENTRAL_NODE_ID, ContainerStartKind, Location, NodeMetrics};
use weave_migration::{MigrationError, MigrationPhase, MigrationReason, MigrationRequest, MigrationState};
use weave_scheduler::{
    AssignmentAlgorithm, EdgeNodeRegistration, MetricsReport, MetricsUpsert, Placement,
    SchedulerError, StaticLoadPredictor, TraceStep, UserSpec,
};

fn fabric(config: &FabricConfig) -> (FabricHandle, tokio::task::JoinHandle<()>) {
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(SimulatedRuntime::new());
    spawn_fabric(config, Some(runtime))
}

async fn register(handle: &FabricHandle, id: &str, x: f64, y: f64) {
    handle
        .register_edge_node(EdgeNodeRegistration::new(id, Location::new(x, y)).with_coverage(300.0))
        .await
        .expect("register");
}

#[tokio::test]
async fn test_user_lifecycle_through_handle() {
    let (handle, _actor) = fabric(&FabricConfig::default());
    register(&handle, "edge-a", 0.0, 0.0).await;

    let user = handle
        .create_user(UserSpec::new("u1", Location::new(50.0, 50.0)))
        .await
        .expect("create");
    assert_eq!(user.assigned_node_id, "edge-a");

    let far = handle
        .create_user(UserSpec::new("u2", Location::new(1000.0, 1000.0)))
        .await
        .expect("create");
    assert_eq!(far.assigned_node_id, CENTRAL_NODE_ID);

    let moved = handle
        .update_user("u1", Location::new(60.0, 40.0), Some(2048), Some(3.5))
        .await
        .expect("update");
    assert_eq!(moved.size, 2048);
    assert_eq!(moved.location, Location::new(60.0, 40.0));

    let status = handle.cluster_status().await.expect("status");
    assert_eq!(status.total_users(), 2);
    assert_eq!(status.node("edge-a").expect("edge").assigned_users, 1);

    handle.delete_user("u1").await.expect("delete");
    let err = handle.delete_user("u1").await.expect_err("gone");
    assert!(matches!(
        err,
        FabricError::Scheduler(SchedulerError::NotFound { kind: "user", .. })
    ));
}

#[tokio::test]
async fn test_duplicate_registration_and_metrics_upsert() {
    let (handle, _actor) = fabric(&FabricConfig::default());
    register(&handle, "edge-a", 0.0, 0.0).await;

    let err = handle
        .register_edge_node(EdgeNodeRegistration::new("edge-a", Location::new(5.0, 5.0)))
        .await
        .expect_err("duplicate");
    assert!(matches!(err, FabricError::Scheduler(SchedulerError::DuplicateNode(_))));

    let upsert = handle
        .update_node_metrics(MetricsReport::new("edge-a", NodeMetrics::with_usage(40.0, 30.0)))
        .await
        .expect("update");
    assert_eq!(upsert, MetricsUpsert::Updated);

    let mut report = MetricsReport::new("edge-b", NodeMetrics::with_usage(10.0, 10.0));
    report.location = Some(Location::new(800.0, 100.0));
    let upsert = handle.update_node_metrics(report).await.expect("upsert");
    assert_eq!(upsert, MetricsUpsert::Registered);

    let status = handle.cluster_status().await.expect("status");
    assert_eq!(status.edge_nodes.len(), 2);
    assert_eq!(status.health.healthy, 3);
}

#[tokio::test]
async fn test_scheduling_algorithms() {
    let (handle, _actor) = fabric(&FabricConfig::default());
    register(&handle, "edge-a", 0.0, 0.0).await;

    let placement = handle
        .schedule_user(Location::new(10.0, 10.0), 1_000)
        .await
        .expect("schedule");
    assert_eq!(placement.node_id(), Some("edge-a"));

    let previous = handle
        .set_assignment_algorithm(AssignmentAlgorithm::Gap)
        .await
        .expect("switch");
    assert_eq!(previous, AssignmentAlgorithm::Greedy);
    assert_eq!(
        handle.assignment_algorithm().await.expect("algorithm"),
        AssignmentAlgorithm::Gap
    );

    handle
        .create_user(UserSpec::new("u1", Location::new(10.0, 10.0)).with_size(1_000_000))
        .await
        .expect("create");
    let (plan, stats) = handle.gap_plan().await.expect("plan");
    assert_eq!(plan.len(), 1);
    assert_eq!(stats.users, 1);
    assert!(plan[0].utility_gain >= 0.0);

    // Predictive without a predictor falls back to nearest-node placement.
    handle
        .set_assignment_algorithm(AssignmentAlgorithm::Predictive)
        .await
        .expect("switch");
    let placement = handle
        .schedule_user(Location::new(10.0, 10.0), 1_000)
        .await
        .expect("schedule");
    assert!(matches!(placement, Placement::Assigned { .. }));
}

#[tokio::test]
async fn test_trace_steps_create_and_move_users() {
    let (handle, _actor) = fabric(&FabricConfig::default());
    register(&handle, "edge-a", 0.0, 0.0).await;
    handle.set_trace_replay(true).await.expect("replay");

    let row = |x: f64, t: u64| TraceStep {
        user_id: "walker".to_string(),
        x,
        y: 0.0,
        size: 4_096,
        speed: 2.0,
        timestep: t,
    };
    let batch = handle
        .apply_trace_steps(vec![row(10.0, 0), row(20.0, 1), row(f64::INFINITY, 2)])
        .await
        .expect("apply");
    assert_eq!(batch.applied, 2);
    assert_eq!(batch.rejected, 1);

    let status = handle.cluster_status().await.expect("status");
    let walker = status.users.iter().find(|u| u.id == "walker").expect("walker");
    assert_eq!(walker.location, Location::new(20.0, 0.0));
}

#[tokio::test]
async fn test_migration_failure_cancel_and_stats() {
    let (handle, _actor) = fabric(&FabricConfig::default());
    register(&handle, "edge-a", 0.0, 0.0).await;

    // Nothing lives on edge-a, so preparation fails.
    let request = MigrationRequest::new(
        ContainerId::generate(),
        "edge-a",
        CENTRAL_NODE_ID,
        MigrationReason::LoadBalancing,
    );
    let id = handle.request_migration(request).await.expect("request");
    let status = handle.execute_migration(id).await.expect("execute");
    assert_eq!(status.status, MigrationState::Failed);
    assert_eq!(status.failed_phase, Some(MigrationPhase::PrepareTarget));
    assert!(status.progress < 1.0);
    assert_eq!(
        handle.migration_status(id).await.expect("status").map(|s| s.status),
        Some(MigrationState::Failed)
    );

    let err = handle.cancel_migration(id).await.expect_err("finished");
    assert!(matches!(
        err,
        FabricError::Migration(MigrationError::InvalidState { .. })
    ));

    let second = MigrationRequest::new(
        ContainerId::generate(),
        "edge-a",
        CENTRAL_NODE_ID,
        MigrationReason::HighLoad,
    );
    let pending = handle.request_migration(second).await.expect("request");
    let cancelled = handle.cancel_migration(pending).await.expect("cancel");
    assert_eq!(cancelled.status, MigrationState::Cancelled);

    let stats = handle.migration_stats().await.expect("stats");
    assert_eq!(stats.total_requested, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.success_rate, 0.0);

    let recent = handle.recent_migrations(10).await.expect("history");
    assert_eq!(
        recent.iter().map(|s| (s.id, s.status)).collect::<Vec<_>>(),
        vec![(pending, MigrationState::Cancelled), (id, MigrationState::Failed)]
    );
    assert_eq!(handle.recent_migrations(1).await.expect("history").len(), 1);

    let bad = MigrationRequest::new(
        ContainerId::generate(),
        "edge-a",
        "edge-a",
        MigrationReason::HighLoad,
    );
    let err = handle.request_migration(bad).await.expect_err("same node");
    assert!(matches!(
        err,
        FabricError::Migration(MigrationError::InvalidRequest(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_agents_execute_and_auto_migrate() {
    let mut config = FabricConfig::default();
    config.agents.execution_secs = 3600.0;
    config.agents.auto_migration_secs = 2.0;
    let (handle, _actor) = fabric(&config);
    register(&handle, "edge-a", 0.0, 0.0).await;
    register(&handle, "edge-b", 1000.0, 700.0).await;
    handle
        .create_user(UserSpec::new("u1", Location::new(50.0, 50.0)))
        .await
        .expect("create");

    let driver = ExecutionDriver {
        executor: Arc::new(SimulatedExecutor::new(10, 10)),
        function: "echo".to_string(),
        image: "edgeweave/echo:latest".to_string(),
    };
    let agents = AgentSet::spawn(&handle, &config.agents, Some(driver));
    assert!(agents.names().contains(&"execution"));

    tokio::time::sleep(Duration::from_millis(500)).await;
    let status = handle.cluster_status().await.expect("status");
    let edge = status.node("edge-a").expect("edge");
    assert_eq!(edge.metrics.warm_containers, 1);
    assert_eq!(edge.metrics.running_containers, 0);
    assert!(edge.metrics.avg_response_time_ms > 0.0);
    let user = status.users.iter().find(|u| u.id == "u1").expect("user");
    assert_eq!(user.container_start, ContainerStartKind::Cold);

    handle
        .update_node_metrics(MetricsReport::new("edge-a", NodeMetrics::with_usage(95.0, 20.0)))
        .await
        .expect("hot");
    tokio::time::sleep(Duration::from_millis(2000)).await;

    let stats = handle.migration_stats().await.expect("stats");
    assert_eq!(stats.completed, 1);
    let status = handle.cluster_status().await.expect("status");
    assert_eq!(status.node("edge-a").expect("edge").metrics.warm_containers, 0);
    assert_eq!(status.central.metrics.warm_containers, 1);

    agents.shutdown().await;
}

#[tokio::test]
async fn test_actor_stops_with_last_handle() {
    let (handle, actor) = fabric(&FabricConfig::default());
    let clone = handle.clone();
    drop(handle);
    assert!(!clone.is_closed());
    drop(clone);
    tokio::time::timeout(Duration::from_secs(5), actor)
        .await
        .expect("actor stopped")
        .expect("join");
}

#[tokio::test(start_paused = true)]
async fn test_random_walk_simulation() {
    let mut config = FabricConfig::default();
    config.simulation.edge_nodes = 2;
    config.simulation.users = 5;
    config.simulation.duration_secs = 3.0;
    config.simulation.seed = Some(11);
    config.agents.execution_secs = 1.0;

    let report = Simulation::new(config).run().await.expect("simulation");
    assert!(report.steps >= 5, "steps: {}", report.steps);
    assert_eq!(report.rejected_rows, 0);
    assert_eq!(report.status.edge_nodes.len(), 2);
    assert_eq!(report.status.total_users(), 5);
    assert!(report.gap.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_replayed_trace_ends_simulation() {
    let row = |user: &str, x: f64, t: u64| TraceStep {
        user_id: user.to_string(),
        x,
        y: 100.0,
        size: 1_000,
        speed: 1.0,
        timestep: t,
    };
    let replay = TraceReplay::from_steps(vec![
        row("a", 10.0, 0),
        row("b", 900.0, 0),
        row("a", 15.0, 1),
        row("b", 905.0, 2),
    ]);

    let mut config = FabricConfig::default();
    config.simulation.duration_secs = 600.0;
    config.scheduler.algorithm = AssignmentAlgorithm::Predictive;

    let report = Simulation::new(config)
        .with_feed(TraceFeed::Replay(replay))
        .with_predictor(Arc::new(StaticLoadPredictor::new().with_load("edge-0", 50.0)))
        .run()
        .await
        .expect("simulation");
    assert_eq!(report.steps, 3);
    assert_eq!(report.trace_rows, 4);
    assert_eq!(report.status.total_users(), 2);
}
