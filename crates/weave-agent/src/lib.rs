//! Edgeweave fabric agent.
//!
//! Ties the scheduler, the container lifecycle managers and the migration
//! manager into one running fabric:
//!
//! - [`FabricActor`] owns all mutable state and applies [`FabricCommand`]s
//!   one at a time
//! - [`FabricHandle`] is the cloneable caller-side API
//! - [`AgentSet`] runs the periodic sweeps, the reassignment scan, the
//!   auto-migration scan and, in simulation, the execution driver
//! - [`Simulation`] drives the whole fabric from a mobility trace and
//!   synthetic node metrics
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use weave_agent::{FabricConfig, spawn_fabric};
//! use weave_container::{ContainerRuntime, SimulatedRuntime};
//! use weave_core::Location;
//! use weave_scheduler::UserSpec;
//!
//! # async fn demo() -> weave_agent::Result<()> {
//! let runtime: Arc<dyn ContainerRuntime> = Arc::new(SimulatedRuntime::new());
//! let (handle, _actor) = spawn_fabric(&FabricConfig::default(), Some(runtime));
//!
//! let user = handle
//!     .create_user(UserSpec::new("u1", Location::new(10.0, 10.0)))
//!     .await?;
//! println!("{} served by {}", user.id, user.assigned_node_id);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

use std::sync::Arc;

use tokio::task::JoinHandle;
use weave_container::ContainerRuntime;

pub mod actor;
pub mod agents;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod handle;
pub mod sim;
pub mod trace;

pub use actor::FabricActor;
pub use agents::{AgentSet, ExecutionDriver};
pub use command::{AutoMigrationReport, FabricCommand, TraceBatch};
pub use config::{AgentConfig, FabricConfig, SimulationConfig};
pub use error::{FabricError, Result};
pub use executor::{
    ExecutionFuture, FunctionExecutor, InvocationLease, InvocationOutcome, SimulatedExecutor,
};
pub use handle::FabricHandle;
pub use sim::{Simulation, SimulationReport, SyntheticReporters, edge_grid};
pub use trace::{RandomWalkTrace, TraceFeed, TraceReplay};

/// Spawns a fabric actor and returns its handle and task.
///
/// The actor stops once every clone of the handle has been dropped.
pub fn spawn_fabric(
    config: &FabricConfig,
    runtime: Option<Arc<dyn ContainerRuntime>>,
) -> (FabricHandle, JoinHandle<()>) {
    let (actor, handle) = FabricActor::new(config, runtime);
    (handle, actor.spawn())
}
