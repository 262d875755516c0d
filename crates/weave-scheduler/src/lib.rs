//! User placement for the Edgeweave fabric.
//!
//! This crate owns the scheduling side of the fabric:
//!
//! - [`NodeRegistry`]: central node, edge nodes and users, with
//!   registration, heartbeat eviction and the reassignment scan
//! - [`strategy`]: the `greedy`, `gap` and `predictive` placement
//!   algorithms
//! - [`gap`]: the latency-gain profit matrix and its greedy solver
//! - [`hysteresis`]: dwell time and improvement margin gating handoffs
//! - [`health`]: CPU/memory health buckets
//!
//! # Example
//!
//! ```rust
//! use weave_core::Location;
//! use weave_scheduler::{EdgeNodeRegistration, NodeRegistry, SchedulerConfig, UserSpec};
//!
//! let mut registry = NodeRegistry::new(SchedulerConfig::default());
//! registry
//!     .register_edge_node(
//!         EdgeNodeRegistration::new("edge-a", Location::new(0.0, 0.0)).with_coverage(300.0),
//!     )
//!     .unwrap();
//!
//! let user = registry
//!     .create_user(UserSpec::new("u1", Location::new(50.0, 50.0)))
//!     .unwrap();
//! assert_eq!(user.assigned_node_id, "edge-a");
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod gap;
pub mod health;
pub mod hysteresis;
pub mod registry;
pub mod status;
pub mod strategy;
pub mod types;

pub use config::{CentralNodeConfig, SchedulerConfig};
pub use error::{Result, SchedulerError};
pub use gap::{
    AssignmentStats, CLOUD_NODE_ID, GapAssignment, GapConfig, GapNode, GapSolver, GapUser,
    NodeType, ProfitMatrix, SolverKind, assignment_stats,
};
pub use health::{HealthCounts, HealthThresholds, NodeHealthReport};
pub use hysteresis::{HandoffDecision, HandoffPolicy, HoldReason};
pub use registry::NodeRegistry;
pub use status::{ClusterStatus, NodeSummary, UserSummary};
pub use strategy::{
    AssignmentAlgorithm, LoadPrediction, LoadPredictor, Placement, StaticLoadPredictor,
};
pub use types::{
    EdgeNodeRegistration, Handoff, MetricsReport, MetricsUpsert, Node, NodeKind, TraceStep,
    UserNode, UserSpec,
};
