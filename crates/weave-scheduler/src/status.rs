//! Cluster status snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weave_core::{ContainerStartKind, HealthStatus, Location, NodeId, NodeMetrics};

use crate::health::HealthCounts;
use crate::strategy::AssignmentAlgorithm;
use crate::types::NodeKind;

/// One node as seen in a status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    /// Node id.
    pub id: NodeId,
    /// Edge or central.
    pub kind: NodeKind,
    /// Advertised endpoint.
    pub endpoint: String,
    /// Position.
    pub location: Location,
    /// Coverage radius.
    pub coverage_radius: f64,
    /// Health bucket.
    pub health: HealthStatus,
    /// Latest metrics, container counts included.
    pub metrics: NodeMetrics,
    /// Users currently assigned to the node.
    pub assigned_users: usize,
    /// Last heartbeat.
    pub last_heartbeat: DateTime<Utc>,
}

/// One user as seen in a status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    /// User id.
    pub id: String,
    /// Position.
    pub location: Location,
    /// Serving node.
    pub assigned_node_id: NodeId,
    /// Distance to the serving node in meters.
    pub distance_m: f64,
    /// Latest turnaround estimate.
    pub total_turnaround_ms: f64,
    /// Start kind of the last execution.
    pub container_start: ContainerStartKind,
    /// Last update.
    pub last_updated: DateTime<Utc>,
}

/// Point-in-time view of the whole fabric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Active placement algorithm.
    pub algorithm: AssignmentAlgorithm,
    /// The central node.
    pub central: NodeSummary,
    /// Edge nodes in id order.
    pub edge_nodes: Vec<NodeSummary>,
    /// Users in id order.
    pub users: Vec<UserSummary>,
    /// Health bucket sizes across all nodes.
    pub health: HealthCounts,
    /// Snapshot time.
    pub generated_at: DateTime<Utc>,
}

impl ClusterStatus {
    /// Total number of users.
    #[must_use]
    pub fn total_users(&self) -> usize {
        self.users.len()
    }

    /// Summary of `node_id`, central included.
    #[must_use]
    pub fn node(&self, node_id: &str) -> Option<&NodeSummary> {
        std::iter::once(&self.central)
            .chain(&self.edge_nodes)
            .find(|n| n.id == node_id)
    }
}
