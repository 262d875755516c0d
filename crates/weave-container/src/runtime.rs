//! Container runtime capability.
//!
//! The lifecycle manager never talks to a concrete container engine. It
//! drives a [`ContainerRuntime`], which a node process backs with whatever
//! engine it has. [`SimulatedRuntime`] is the in-memory implementation used
//! by the simulation harness and the tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{ContainerError, ContainerId, ContainerResult};
use crate::spec::ContainerSpec;

/// Boxed future returned by runtime operations.
pub type RuntimeFuture<'a, T> = Pin<Box<dyn Future<Output = ContainerResult<T>> + Send + 'a>>;

/// Container runtime trait for the operations the lifecycle manager needs.
pub trait ContainerRuntime: Send + Sync + std::fmt::Debug {
    /// Create a container from a spec.
    ///
    /// # Errors
    ///
    /// Returns error if container creation fails.
    fn create<'a>(&'a self, spec: &'a ContainerSpec) -> RuntimeFuture<'a, ContainerId>;

    /// Start (or restart) a container.
    ///
    /// # Errors
    ///
    /// Returns error if container start fails.
    fn start<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()>;

    /// Stop a running container, keeping it for reuse.
    ///
    /// # Errors
    ///
    /// Returns error if container stop fails.
    fn stop<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()>;

    /// Remove a container.
    ///
    /// # Errors
    ///
    /// Returns error if container removal fails.
    fn remove<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()>;

    /// Check if runtime is available.
    ///
    /// # Errors
    ///
    /// Returns error if runtime is not available.
    fn ping(&self) -> RuntimeFuture<'_, ()>;

    /// Get runtime info.
    fn info(&self) -> RuntimeInfo;
}

/// Information about the container runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeInfo {
    /// Runtime name.
    pub name: String,

    /// Runtime version.
    pub version: String,

    /// Number of containers known to the runtime.
    pub containers: u32,

    /// Number of running containers.
    pub containers_running: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimState {
    Created,
    Running,
    Stopped,
}

/// In-memory runtime for simulation and tests.
#[derive(Debug, Default)]
pub struct SimulatedRuntime {
    containers: Mutex<HashMap<ContainerId, SimState>>,
    unavailable: AtomicBool,
}

impl SimulatedRuntime {
    /// Create an available runtime with no containers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend going away or coming back.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of containers the runtime currently holds.
    #[must_use]
    pub fn container_count(&self) -> usize {
        self.containers.lock().len()
    }

    fn check_available(&self) -> ContainerResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ContainerError::RuntimeUnavailable(
                "simulated runtime is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn transition(&self, id: &ContainerId, next: SimState) -> ContainerResult<()> {
        self.check_available()?;
        let mut containers = self.containers.lock();
        let state = containers
            .get_mut(id)
            .ok_or_else(|| ContainerError::NotFound {
                id: id.as_str().to_string(),
            })?;
        trace!(container = %id, from = ?state, to = ?next, "simulated transition");
        *state = next;
        Ok(())
    }
}

impl ContainerRuntime for SimulatedRuntime {
    fn create<'a>(&'a self, spec: &'a ContainerSpec) -> RuntimeFuture<'a, ContainerId> {
        let result = self.check_available().and_then(|()| {
            spec.validate()?;
            let id = ContainerId::generate();
            self.containers.lock().insert(id.clone(), SimState::Created);
            Ok(id)
        });
        Box::pin(std::future::ready(result))
    }

    fn start<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()> {
        Box::pin(std::future::ready(self.transition(id, SimState::Running)))
    }

    fn stop<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()> {
        Box::pin(std::future::ready(self.transition(id, SimState::Stopped)))
    }

    fn remove<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()> {
        let result = self.check_available().and_then(|()| {
            self.containers
                .lock()
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| ContainerError::NotFound {
                    id: id.as_str().to_string(),
                })
        });
        Box::pin(std::future::ready(result))
    }

    fn ping(&self) -> RuntimeFuture<'_, ()> {
        Box::pin(std::future::ready(self.check_available()))
    }

    fn info(&self) -> RuntimeInfo {
        let containers = self.containers.lock();
        RuntimeInfo {
            name: "simulated".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            containers: containers.len() as u32,
            containers_running: containers
                .values()
                .filter(|s| **s == SimState::Running)
                .count() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_runtime_lifecycle() {
        let runtime = SimulatedRuntime::new();
        let spec = ContainerSpec::new("resize", "fn/resize:1");

        let id = runtime.create(&spec).await.expect("create");
        runtime.start(&id).await.expect("start");
        assert_eq!(runtime.info().containers_running, 1);

        runtime.stop(&id).await.expect("stop");
        assert_eq!(runtime.info().containers_running, 0);
        assert_eq!(runtime.info().containers, 1);

        runtime.remove(&id).await.expect("remove");
        assert_eq!(runtime.container_count(), 0);
        assert!(runtime.start(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_simulated_runtime_offline() {
        let runtime = SimulatedRuntime::new();
        runtime.set_available(false);

        let err = runtime
            .create(&ContainerSpec::new("resize", "fn/resize:1"))
            .await
            .expect_err("offline runtime rejects create");
        assert!(matches!(err, ContainerError::RuntimeUnavailable(_)));
        assert!(runtime.ping().await.is_err());

        runtime.set_available(true);
        assert!(runtime.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_simulated_runtime_validates_spec() {
        let runtime = SimulatedRuntime::new();
        let err = runtime
            .create(&ContainerSpec::new("", "img"))
            .await
            .expect_err("empty name rejected");
        assert!(matches!(err, ContainerError::InvalidSpec(_)));
    }

    #[test]
    fn test_runtime_info_default() {
        let info = RuntimeInfo::default();
        assert!(info.name.is_empty());
        assert_eq!(info.containers, 0);
    }
}
