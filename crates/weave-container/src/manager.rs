//! Per-node container lifecycle manager.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use weave_core::{ContainerStartKind, NodeId};

use crate::error::{ContainerError, ContainerId, ContainerResult};
use crate::runtime::ContainerRuntime;
use crate::spec::{ContainerSpec, ResourceLimits};
use crate::state::{Container, ContainerState};

/// Lifecycle tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long a `WARM` container stays eligible for reuse.
    pub max_warm_time_secs: f64,
    /// Limits applied to containers created by `get_or_create`.
    pub default_limits: ResourceLimits,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_warm_time_secs: 5.0,
            default_limits: ResourceLimits::default(),
        }
    }
}

impl LifecycleConfig {
    /// Warm window as a time delta.
    #[must_use]
    pub fn max_warm_time(&self) -> TimeDelta {
        secs_to_delta(self.max_warm_time_secs)
    }
}

pub(crate) fn secs_to_delta(secs: f64) -> TimeDelta {
    TimeDelta::milliseconds((secs * 1000.0).round() as i64)
}

/// A container handed out for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acquired {
    /// Container serving the invocation, now `RUNNING`.
    pub container_id: ContainerId,
    /// Whether the container was reused or freshly created.
    pub start: ContainerStartKind,
}

/// Live containers per state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerCounts {
    /// Created, not started.
    pub init: u32,
    /// Executing.
    pub running: u32,
    /// Stopped and reusable.
    pub warm: u32,
}

impl ContainerCounts {
    /// All live containers.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.init + self.running + self.warm
    }
}

/// Container state machine for one node.
#[derive(Debug)]
pub struct LifecycleManager {
    node_id: NodeId,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    containers: HashMap<ContainerId, Container>,
    config: LifecycleConfig,
    reaped_total: u64,
}

impl LifecycleManager {
    /// Creates a manager for `node_id`. Without a runtime every operation
    /// that needs one fails with [`ContainerError::RuntimeUnavailable`].
    #[must_use]
    pub fn new(
        node_id: impl Into<NodeId>,
        runtime: Option<Arc<dyn ContainerRuntime>>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            runtime,
            containers: HashMap::new(),
            config,
            reaped_total: 0,
        }
    }

    /// Node this manager belongs to.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Lifecycle configuration.
    #[must_use]
    pub const fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Whether a runtime handle is attached.
    #[must_use]
    pub fn has_runtime(&self) -> bool {
        self.runtime.is_some()
    }

    /// Looks up a live container.
    #[must_use]
    pub fn get(&self, id: &ContainerId) -> Option<&Container> {
        self.containers.get(id)
    }

    /// All live containers, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<&Container> {
        let mut containers: Vec<&Container> = self.containers.values().collect();
        containers.sort_by_key(|c| c.created_at);
        containers
    }

    /// Live container counts per state.
    #[must_use]
    pub fn counts(&self) -> ContainerCounts {
        let mut counts = ContainerCounts::default();
        for container in self.containers.values() {
            match container.state {
                ContainerState::Init => counts.init += 1,
                ContainerState::Running => counts.running += 1,
                ContainerState::Warm => counts.warm += 1,
                ContainerState::Dead => {}
            }
        }
        counts
    }

    /// Containers reaped since the manager was created.
    #[must_use]
    pub const fn reaped_total(&self) -> u64 {
        self.reaped_total
    }

    /// Checks the runtime is reachable.
    pub async fn ping(&self) -> ContainerResult<()> {
        self.runtime()?.ping().await
    }

    /// Creates a container in `INIT`.
    pub async fn create(
        &mut self,
        name: &str,
        image: &str,
        limits: ResourceLimits,
    ) -> ContainerResult<ContainerId> {
        self.create_at(name, image, limits, Utc::now()).await
    }

    /// Creates a container in `INIT` at a specific time.
    pub async fn create_at(
        &mut self,
        name: &str,
        image: &str,
        limits: ResourceLimits,
        now: DateTime<Utc>,
    ) -> ContainerResult<ContainerId> {
        let spec = ContainerSpec::new(name, image).with_limits(limits);
        spec.validate()?;
        let runtime = Arc::clone(self.runtime()?);
        let id = runtime.create(&spec).await?;

        debug!(node = %self.node_id, container = %id, function = name, "container created");
        self.containers
            .insert(id.clone(), Container::new(id.clone(), name, image, limits, now));
        Ok(id)
    }

    /// Moves a container from `INIT` to `RUNNING`.
    pub async fn start(&mut self, id: &ContainerId) -> ContainerResult<()> {
        self.start_at(id, Utc::now()).await
    }

    /// Moves a container from `INIT` to `RUNNING` at a specific time.
    pub async fn start_at(&mut self, id: &ContainerId, now: DateTime<Utc>) -> ContainerResult<()> {
        self.check_transition(id, ContainerState::Init, ContainerState::Running)?;
        let runtime = Arc::clone(self.runtime()?);
        runtime.start(id).await?;
        self.enter_running(id, now);
        Ok(())
    }

    /// Returns a running container for `function`, reusing a warm one when
    /// possible.
    pub async fn get_or_create(
        &mut self,
        function: &str,
        image: &str,
    ) -> ContainerResult<Acquired> {
        self.get_or_create_at(function, image, Utc::now()).await
    }

    /// [`get_or_create`](Self::get_or_create) at a specific time.
    ///
    /// The most recently stopped `WARM` container whose idle time is within
    /// the warm window is restarted and repurposed for `function`. Expired
    /// warm containers are left for the reaper.
    pub async fn get_or_create_at(
        &mut self,
        function: &str,
        image: &str,
        now: DateTime<Utc>,
    ) -> ContainerResult<Acquired> {
        let window = self.config.max_warm_time();
        let reusable = self
            .containers
            .values()
            .filter(|c| c.idle_for(now).is_some_and(|idle| idle <= window))
            .max_by_key(|c| c.stopped_at)
            .map(|c| c.id.clone());

        if let Some(id) = reusable {
            let runtime = Arc::clone(self.runtime()?);
            runtime.start(&id).await?;
            if let Some(container) = self.containers.get_mut(&id) {
                container.name = function.to_string();
            }
            self.enter_running(&id, now);
            debug!(node = %self.node_id, container = %id, function, "warm start");
            return Ok(Acquired {
                container_id: id,
                start: ContainerStartKind::Warm,
            });
        }

        let limits = self.config.default_limits;
        let id = self.create_at(function, image, limits, now).await?;
        self.start_at(&id, now).await?;
        debug!(node = %self.node_id, container = %id, function, "cold start");
        Ok(Acquired {
            container_id: id,
            start: ContainerStartKind::Cold,
        })
    }

    /// Moves a container from `RUNNING` to `WARM` after an invocation.
    pub async fn mark_warm(&mut self, id: &ContainerId) -> ContainerResult<()> {
        self.mark_warm_at(id, Utc::now()).await
    }

    /// [`mark_warm`](Self::mark_warm) at a specific time.
    pub async fn mark_warm_at(&mut self, id: &ContainerId, now: DateTime<Utc>) -> ContainerResult<()> {
        self.check_transition(id, ContainerState::Running, ContainerState::Warm)?;
        let runtime = Arc::clone(self.runtime()?);
        runtime.stop(id).await?;
        if let Some(container) = self.containers.get_mut(id) {
            container.state = ContainerState::Warm;
            container.stopped_at = Some(now);
        }
        Ok(())
    }

    /// Removes every `WARM` container idle for longer than `max_warm_secs`.
    pub async fn reap(&mut self, max_warm_secs: f64) -> Vec<Container> {
        self.reap_at(max_warm_secs, Utc::now()).await
    }

    /// [`reap`](Self::reap) at a specific time. Returns the reaped records,
    /// each in `DEAD`.
    pub async fn reap_at(&mut self, max_warm_secs: f64, now: DateTime<Utc>) -> Vec<Container> {
        let window = secs_to_delta(max_warm_secs);
        let expired: Vec<ContainerId> = self
            .containers
            .values()
            .filter(|c| c.idle_for(now).is_some_and(|idle| idle > window))
            .map(|c| c.id.clone())
            .collect();

        let mut reaped = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(container) = self.retire(&id, now).await {
                reaped.push(container);
            }
        }

        if !reaped.is_empty() {
            self.reaped_total += reaped.len() as u64;
            info!(node = %self.node_id, count = reaped.len(), "reaped idle warm containers");
        }
        reaped
    }

    /// Removes a live container regardless of its state.
    pub async fn evict(&mut self, id: &ContainerId) -> ContainerResult<Container> {
        self.evict_at(id, Utc::now()).await
    }

    /// [`evict`](Self::evict) at a specific time.
    pub async fn evict_at(&mut self, id: &ContainerId, now: DateTime<Utc>) -> ContainerResult<Container> {
        if !self.containers.contains_key(id) {
            return Err(ContainerError::NotFound {
                id: id.as_str().to_string(),
            });
        }
        self.retire(id, now).await.ok_or_else(|| ContainerError::NotFound {
            id: id.as_str().to_string(),
        })
    }

    /// Evicts every live container. Used when the node leaves the fabric.
    pub async fn drain(&mut self) -> Vec<Container> {
        let now = Utc::now();
        let ids: Vec<ContainerId> = self.containers.keys().cloned().collect();
        let mut drained = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(container) = self.retire(&id, now).await {
                drained.push(container);
            }
        }
        drained
    }

    /// Transitions to `DEAD` and drops the container from the live set. The
    /// runtime removal is best effort: a container the runtime lost is still
    /// retired locally.
    async fn retire(&mut self, id: &ContainerId, now: DateTime<Utc>) -> Option<Container> {
        if let Some(runtime) = self.runtime.clone() {
            let running = self
                .containers
                .get(id)
                .is_some_and(|c| c.state == ContainerState::Running);
            if running {
                if let Err(e) = runtime.stop(id).await {
                    warn!(node = %self.node_id, container = %id, error = %e, "failed to stop container");
                }
            }
            if let Err(e) = runtime.remove(id).await {
                warn!(node = %self.node_id, container = %id, error = %e, "failed to remove container");
            }
        }

        let mut container = self.containers.remove(id)?;
        container.state = ContainerState::Dead;
        container.stopped_at = Some(now);
        debug!(node = %self.node_id, container = %id, "container dead");
        Some(container)
    }

    fn runtime(&self) -> ContainerResult<&Arc<dyn ContainerRuntime>> {
        self.runtime.as_ref().ok_or_else(|| {
            ContainerError::RuntimeUnavailable(format!(
                "no container runtime attached to node {}",
                self.node_id
            ))
        })
    }

    fn check_transition(
        &self,
        id: &ContainerId,
        expected: ContainerState,
        next: ContainerState,
    ) -> ContainerResult<()> {
        let container = self.containers.get(id).ok_or_else(|| ContainerError::NotFound {
            id: id.as_str().to_string(),
        })?;
        if container.state != expected || !container.state.can_transition_to(next) {
            return Err(ContainerError::InvalidTransition {
                id: id.as_str().to_string(),
                from: container.state,
                to: next,
            });
        }
        Ok(())
    }

    fn enter_running(&mut self, id: &ContainerId, now: DateTime<Utc>) {
        if let Some(container) = self.containers.get_mut(id) {
            container.state = ContainerState::Running;
            container.started_at = Some(now);
            container.invocations += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::SimulatedRuntime;

    fn manager() -> (LifecycleManager, Arc<SimulatedRuntime>) {
        let runtime = Arc::new(SimulatedRuntime::new());
        let manager = LifecycleManager::new(
            "edge-1",
            Some(Arc::clone(&runtime) as Arc<dyn ContainerRuntime>),
            LifecycleConfig::default(),
        );
        (manager, runtime)
    }

    #[tokio::test]
    async fn test_create_without_runtime_fails() {
        let mut manager = LifecycleManager::new("edge-1", None, LifecycleConfig::default());
        let err = manager
            .create("resize", "fn/resize:1", ResourceLimits::default())
            .await
            .expect_err("no runtime");
        assert!(matches!(err, ContainerError::RuntimeUnavailable(_)));
        assert!(!manager.has_runtime());
    }

    #[tokio::test]
    async fn test_create_then_start() {
        let (mut manager, _) = manager();
        let id = manager
            .create("resize", "fn/resize:1", ResourceLimits::default())
            .await
            .expect("create");
        assert_eq!(manager.get(&id).expect("live").state, ContainerState::Init);

        manager.start(&id).await.expect("start");
        let container = manager.get(&id).expect("live");
        assert_eq!(container.state, ContainerState::Running);
        assert!(container.started_at.is_some());
        assert_eq!(container.invocations, 1);
    }

    #[tokio::test]
    async fn test_start_unknown_container() {
        let (mut manager, _) = manager();
        let err = manager
            .start(&ContainerId::generate())
            .await
            .expect_err("unknown");
        assert!(matches!(err, ContainerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid() {
        let (mut manager, _) = manager();
        let id = manager
            .create("resize", "fn/resize:1", ResourceLimits::default())
            .await
            .expect("create");
        manager.start(&id).await.expect("start");
        let err = manager.start(&id).await.expect_err("already running");
        assert!(matches!(
            err,
            ContainerError::InvalidTransition {
                from: ContainerState::Running,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_mark_warm_requires_running() {
        let (mut manager, _) = manager();
        let id = manager
            .create("resize", "fn/resize:1", ResourceLimits::default())
            .await
            .expect("create");
        assert!(manager.mark_warm(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_warm_start_within_window() {
        let (mut manager, _) = manager();
        let t0 = Utc::now();

        let first = manager
            .get_or_create_at("resize", "fn/resize:1", t0)
            .await
            .expect("cold");
        assert_eq!(first.start, ContainerStartKind::Cold);
        manager
            .mark_warm_at(&first.container_id, t0)
            .await
            .expect("warm");

        let second = manager
            .get_or_create_at("thumbnail", "fn/resize:1", t0 + TimeDelta::seconds(4))
            .await
            .expect("warm");
        assert_eq!(second.start, ContainerStartKind::Warm);
        assert_eq!(second.container_id, first.container_id);

        let container = manager.get(&second.container_id).expect("live");
        assert_eq!(container.name, "thumbnail");
        assert_eq!(container.state, ContainerState::Running);
        assert_eq!(container.invocations, 2);
    }

    #[tokio::test]
    async fn test_cold_start_after_window() {
        let (mut manager, _) = manager();
        let t0 = Utc::now();

        let first = manager
            .get_or_create_at("resize", "fn/resize:1", t0)
            .await
            .expect("cold");
        manager
            .mark_warm_at(&first.container_id, t0)
            .await
            .expect("warm");

        let second = manager
            .get_or_create_at("resize", "fn/resize:1", t0 + TimeDelta::seconds(6))
            .await
            .expect("cold again");
        assert_eq!(second.start, ContainerStartKind::Cold);
        assert_ne!(second.container_id, first.container_id);
    }

    #[tokio::test]
    async fn test_running_container_is_not_reused() {
        let (mut manager, _) = manager();
        let t0 = Utc::now();
        let first = manager
            .get_or_create_at("resize", "fn/resize:1", t0)
            .await
            .expect("cold");
        let second = manager
            .get_or_create_at("resize", "fn/resize:1", t0)
            .await
            .expect("cold");
        assert_ne!(first.container_id, second.container_id);
        assert_eq!(second.start, ContainerStartKind::Cold);
        assert_eq!(manager.counts().running, 2);
    }

    #[tokio::test]
    async fn test_most_recently_stopped_warm_container_wins() {
        let (mut manager, _) = manager();
        let t0 = Utc::now();
        let a = manager.get_or_create_at("a", "img", t0).await.expect("a");
        let b = manager.get_or_create_at("b", "img", t0).await.expect("b");
        manager.mark_warm_at(&a.container_id, t0).await.expect("warm a");
        manager
            .mark_warm_at(&b.container_id, t0 + TimeDelta::seconds(1))
            .await
            .expect("warm b");

        let reused = manager
            .get_or_create_at("c", "img", t0 + TimeDelta::seconds(2))
            .await
            .expect("warm");
        assert_eq!(reused.container_id, b.container_id);
    }

    #[tokio::test]
    async fn test_reap_removes_expired_warm_containers() {
        let (mut manager, runtime) = manager();
        let t0 = Utc::now();

        let stale = manager.get_or_create_at("a", "img", t0).await.expect("a");
        let fresh = manager.get_or_create_at("b", "img", t0).await.expect("b");
        let busy = manager.get_or_create_at("c", "img", t0).await.expect("c");
        manager.mark_warm_at(&stale.container_id, t0).await.expect("warm");
        manager
            .mark_warm_at(&fresh.container_id, t0 + TimeDelta::seconds(4))
            .await
            .expect("warm");

        let reaped = manager.reap_at(5.0, t0 + TimeDelta::seconds(6)).await;
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].id, stale.container_id);
        assert_eq!(reaped[0].state, ContainerState::Dead);

        assert!(manager.get(&stale.container_id).is_none());
        assert!(manager.get(&fresh.container_id).is_some());
        assert!(manager.get(&busy.container_id).is_some());
        assert_eq!(manager.reaped_total(), 1);
        assert_eq!(runtime.container_count(), 2);
    }

    #[tokio::test]
    async fn test_dead_container_is_never_returned() {
        let (mut manager, _) = manager();
        let t0 = Utc::now();

        let first = manager.get_or_create_at("a", "img", t0).await.expect("a");
        manager.mark_warm_at(&first.container_id, t0).await.expect("warm");
        let reaped = manager.reap_at(5.0, t0 + TimeDelta::seconds(10)).await;
        assert_eq!(reaped.len(), 1);

        for i in 0..5 {
            let acquired = manager
                .get_or_create_at("a", "img", t0 + TimeDelta::seconds(11 + i))
                .await
                .expect("acquire");
            assert_ne!(acquired.container_id, first.container_id);
            manager
                .mark_warm_at(&acquired.container_id, t0 + TimeDelta::seconds(11 + i))
                .await
                .expect("warm");
        }
        let err = manager.start(&first.container_id).await.expect_err("dead");
        assert!(matches!(err, ContainerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_init_container_is_never_reused() {
        let (mut manager, _) = manager();
        let idle = manager
            .create("a", "img", ResourceLimits::default())
            .await
            .expect("create");
        let acquired = manager.get_or_create("a", "img").await.expect("acquire");
        assert_ne!(acquired.container_id, idle);
        assert_eq!(acquired.start, ContainerStartKind::Cold);
    }

    #[tokio::test]
    async fn test_evict_and_drain() {
        let (mut manager, runtime) = manager();
        let a = manager.get_or_create("a", "img").await.expect("a");
        let b = manager.get_or_create("b", "img").await.expect("b");

        let evicted = manager.evict(&a.container_id).await.expect("evict");
        assert_eq!(evicted.state, ContainerState::Dead);
        assert!(manager.evict(&a.container_id).await.is_err());

        let drained = manager.drain().await;
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].id, b.container_id);
        assert_eq!(manager.counts().total(), 0);
        assert_eq!(runtime.container_count(), 0);
    }

    #[tokio::test]
    async fn test_retire_survives_runtime_outage() {
        let (mut manager, runtime) = manager();
        let a = manager.get_or_create("a", "img").await.expect("a");
        runtime.set_available(false);

        let evicted = manager.evict(&a.container_id).await.expect("evict");
        assert_eq!(evicted.state, ContainerState::Dead);
        assert!(manager.get(&a.container_id).is_none());

        let err = manager.get_or_create("b", "img").await.expect_err("offline");
        assert!(matches!(err, ContainerError::RuntimeUnavailable(_)));
    }

    #[test]
    fn test_config_default() {
        let config = LifecycleConfig::default();
        assert!((config.max_warm_time_secs - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.max_warm_time(), TimeDelta::seconds(5));
    }
}
