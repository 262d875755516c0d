//! Function execution outside the actor.
//!
//! The actor hands out an [`InvocationLease`] per user: the serving
//! container is already `RUNNING` on the user's node. An executor spends the
//! wall-clock time of the invocation and returns an [`InvocationOutcome`],
//! which is posted back so the container can go warm and the latency can be
//! recorded.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use weave_container::ContainerId;
use weave_core::{ContainerStartKind, NodeId};

use crate::config::SimulationConfig;

/// A container checked out for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationLease {
    /// User the invocation is made for.
    pub user_id: String,
    /// Node serving the invocation.
    pub node_id: NodeId,
    /// Container serving the invocation.
    pub container_id: ContainerId,
    /// Whether the container was reused.
    pub start: ContainerStartKind,
    /// Function invoked.
    pub function: String,
    /// When the lease was issued.
    pub issued_at: DateTime<Utc>,
}

/// Result of running one leased invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationOutcome {
    /// The lease this outcome settles.
    pub lease: InvocationLease,
    /// Observed computation time.
    pub computation_ms: f64,
    /// Whether the function completed.
    pub succeeded: bool,
}

/// Boxed future returned by [`FunctionExecutor::execute`].
pub type ExecutionFuture<'a> = Pin<Box<dyn Future<Output = InvocationOutcome> + Send + 'a>>;

/// Runs leased invocations.
pub trait FunctionExecutor: Send + Sync + fmt::Debug {
    /// Execute the function for `lease`. Never fails: a failed run is an
    /// outcome with `succeeded == false`.
    fn execute(&self, lease: InvocationLease) -> ExecutionFuture<'_>;
}

/// Executor that sleeps for a random duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedExecutor {
    min_ms: u64,
    max_ms: u64,
    cold_start_penalty_ms: u64,
}

impl SimulatedExecutor {
    /// Executor drawing computation times from `min_ms..=max_ms`.
    #[must_use]
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: max_ms.max(min_ms),
            cold_start_penalty_ms: 0,
        }
    }

    /// Adds a fixed delay to cold starts.
    #[must_use]
    pub const fn with_cold_start_penalty(mut self, penalty_ms: u64) -> Self {
        self.cold_start_penalty_ms = penalty_ms;
        self
    }

    /// Executor configured from the simulation settings.
    #[must_use]
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.min_execution_ms, config.max_execution_ms)
            .with_cold_start_penalty(config.cold_start_penalty_ms)
    }

    fn draw(&self, start: ContainerStartKind) -> Duration {
        let base = rand::thread_rng().gen_range(self.min_ms..=self.max_ms);
        let penalty = if start == ContainerStartKind::Cold {
            self.cold_start_penalty_ms
        } else {
            0
        };
        Duration::from_millis(base + penalty)
    }
}

impl FunctionExecutor for SimulatedExecutor {
    fn execute(&self, lease: InvocationLease) -> ExecutionFuture<'_> {
        let delay = self.draw(lease.start);
        Box::pin(async move {
            let started = Instant::now();
            tokio::time::sleep(delay).await;
            InvocationOutcome {
                computation_ms: started.elapsed().as_secs_f64() * 1000.0,
                lease,
                succeeded: true,
            }
        })
    }
}

#[cfg(test)]
pub(crate) fn test_lease(start: ContainerStartKind) -> InvocationLease {
    InvocationLease {
        user_id: "u1".to_string(),
        node_id: "edge-1".to_string(),
        container_id: ContainerId::generate(),
        start,
        function: "echo".to_string(),
        issued_at: Utc::now(),
    }
}
