//! Function container lifecycle for Edgeweave nodes.
//!
//! Each node owns a [`LifecycleManager`] that drives containers through a
//! small state machine on top of an abstract [`ContainerRuntime`]:
//!
//! ```text
//! INIT --start--> RUNNING --mark_warm--> WARM --reap/evict--> DEAD
//!                    ^                     |
//!                    +------ reuse --------+
//! ```
//!
//! [`LifecycleManager::get_or_create`] prefers a recently stopped `WARM`
//! container (a warm start) and otherwise creates a new one (a cold start).
//! The distinction is reported as [`weave_core::ContainerStartKind`] so the
//! scheduler can account for it in latency figures.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weave_container::{LifecycleConfig, LifecycleManager, SimulatedRuntime};
//!
//! let runtime = Arc::new(SimulatedRuntime::new());
//! let mut manager = LifecycleManager::new("edge-1", Some(runtime), LifecycleConfig::default());
//!
//! let first = manager.get_or_create("resize", "fn/resize:1").await?;
//! manager.mark_warm(&first.container_id).await?;
//! let second = manager.get_or_create("thumbnail", "fn/resize:1").await?;
//! assert_eq!(second.start, weave_core::ContainerStartKind::Warm);
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod fleet;
pub mod manager;
pub mod runtime;
pub mod spec;
pub mod state;

pub use error::{ContainerError, ContainerId, ContainerResult};
pub use fleet::ContainerFleet;
pub use manager::{Acquired, ContainerCounts, LifecycleConfig, LifecycleManager};
pub use runtime::{ContainerRuntime, RuntimeFuture, RuntimeInfo, SimulatedRuntime};
pub use spec::{ContainerSpec, ResourceLimits};
pub use state::{Container, ContainerState};
