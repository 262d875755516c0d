//! Registry records and inbound payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weave_core::{Latency, Location, NodeId, NodeMetrics, SystemInfo};

use crate::error::{Result, SchedulerError};

/// Tier of a registered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Edge node with a bounded coverage radius.
    Edge,
    /// The central node. Covers every location.
    Central,
}

/// A node known to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node id.
    pub id: NodeId,
    /// Edge or central.
    pub kind: NodeKind,
    /// Advertised endpoint.
    pub endpoint: String,
    /// Position in simulation units.
    pub location: Location,
    /// Coverage radius in simulation units. Ignored for the central node.
    pub coverage_radius: f64,
    /// Last metrics report or registration.
    pub last_heartbeat: DateTime<Utc>,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
    /// Latest metrics.
    pub metrics: NodeMetrics,
    /// Host description.
    pub system_info: SystemInfo,
}

impl Node {
    /// Whether the node may serve a user at `location`.
    #[must_use]
    pub fn covers(&self, location: &Location) -> bool {
        match self.kind {
            NodeKind::Central => true,
            NodeKind::Edge => self.location.distance_to(location) <= self.coverage_radius,
        }
    }

    /// Seconds since the last heartbeat.
    #[must_use]
    pub fn silence_secs(&self, now: DateTime<Utc>) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let secs = (now - self.last_heartbeat).num_milliseconds() as f64 / 1000.0;
        secs
    }
}

/// Explicit edge node registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeNodeRegistration {
    /// Node id chosen by the node.
    pub id: NodeId,
    /// Advertised endpoint.
    #[serde(default)]
    pub endpoint: String,
    /// Position. Required.
    pub location: Option<Location>,
    /// Coverage radius. Defaults to the configured radius.
    #[serde(default)]
    pub coverage_radius: Option<f64>,
    /// Initial metrics.
    #[serde(default)]
    pub metrics: NodeMetrics,
    /// Host description.
    #[serde(default)]
    pub system_info: SystemInfo,
}

impl EdgeNodeRegistration {
    /// Registration at `location` with default coverage.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, location: Location) -> Self {
        Self {
            id: id.into(),
            endpoint: String::new(),
            location: Some(location),
            coverage_radius: None,
            metrics: NodeMetrics::default(),
            system_info: SystemInfo::default(),
        }
    }

    /// Sets the coverage radius.
    #[must_use]
    pub const fn with_coverage(mut self, radius: f64) -> Self {
        self.coverage_radius = Some(radius);
        self
    }

    /// Sets the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the initial metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: NodeMetrics) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Periodic metrics report. Unknown edge ids are registered on the fly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Reporting node.
    pub node_id: NodeId,
    /// Endpoint, if the node wants to update it.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Position, used only when the node is auto-registered.
    #[serde(default)]
    pub location: Option<Location>,
    /// Coverage radius, used only when the node is auto-registered.
    #[serde(default)]
    pub coverage_radius: Option<f64>,
    /// Metrics snapshot.
    #[serde(default)]
    pub metrics: NodeMetrics,
    /// Host description, if reported.
    #[serde(default)]
    pub system_info: Option<SystemInfo>,
}

impl MetricsReport {
    /// Report carrying only metrics.
    #[must_use]
    pub fn new(node_id: impl Into<NodeId>, metrics: NodeMetrics) -> Self {
        Self {
            node_id: node_id.into(),
            endpoint: None,
            location: None,
            coverage_radius: None,
            metrics,
            system_info: None,
        }
    }
}

/// What a metrics upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsUpsert {
    /// An existing node was refreshed.
    Updated,
    /// The node was unknown and has been registered.
    Registered,
}

/// A simulated end user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserNode {
    /// User id.
    pub id: String,
    /// Current position.
    pub location: Location,
    /// Node currently serving the user.
    pub assigned_node_id: NodeId,
    /// Request data size in bytes.
    pub size: u64,
    /// Movement speed reported by the trace.
    pub speed: f64,
    /// Turnaround model for the current assignment.
    pub latency: Latency,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last location or size update.
    pub last_updated: DateTime<Utc>,
    /// Last completed function execution.
    pub last_executed: Option<DateTime<Utc>>,
    /// Last reassignment.
    pub last_handoff_at: Option<DateTime<Utc>>,
    /// Whether a trace replay drives this user.
    pub trace_driven: bool,
}

/// Request to create a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSpec {
    /// User id.
    pub id: String,
    /// Position. Required.
    pub location: Option<Location>,
    /// Request data size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Movement speed.
    #[serde(default)]
    pub speed: f64,
}

impl UserSpec {
    /// User at `location` with empty requests.
    #[must_use]
    pub fn new(id: impl Into<String>, location: Location) -> Self {
        Self {
            id: id.into(),
            location: Some(location),
            size: 0,
            speed: 0.0,
        }
    }

    /// Sets the request data size.
    #[must_use]
    pub const fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }
}

/// One row of a mobility trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    /// User id.
    pub user_id: String,
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
    /// Request data size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Movement speed.
    #[serde(default)]
    pub speed: f64,
    /// Trace time step.
    #[serde(default)]
    pub timestep: u64,
}

impl TraceStep {
    /// Position of the step.
    #[must_use]
    pub const fn location(&self) -> Location {
        Location::new(self.x, self.y)
    }
}

/// A completed reassignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handoff {
    /// Moved user.
    pub user_id: String,
    /// Previous node.
    pub from: NodeId,
    /// New node.
    pub to: NodeId,
    /// Relative cost improvement. 1.0 for forced moves.
    pub improvement: f64,
}

pub(crate) fn require_location(location: Option<Location>, what: &str) -> Result<Location> {
    match location {
        Some(loc) if loc.is_finite() => Ok(loc),
        Some(_) => Err(SchedulerError::InvalidData(format!(
            "{what} location must be finite"
        ))),
        None => Err(SchedulerError::InvalidData(format!(
            "{what} location is required"
        ))),
    }
}
