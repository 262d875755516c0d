//! Node, metrics and status value types.

use serde::{Deserialize, Serialize};

/// Node identifier. Edge nodes choose their own ids at registration.
pub type NodeId = String;

/// Fixed id of the singleton central node.
pub const CENTRAL_NODE_ID: &str = "central_node";

/// Planar position in simulation units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Location {
    /// Creates a location from its coordinates.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in simulation units.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Whether both coordinates are finite numbers.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// Resource metrics reported by a node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeMetrics {
    /// CPU utilization in percent (0-100).
    pub cpu_percent: f64,
    /// Memory utilization in percent (0-100).
    pub memory_percent: f64,
    /// Containers currently executing a function.
    pub running_containers: u32,
    /// Stopped containers eligible for warm reuse.
    pub warm_containers: u32,
    /// Moving average of observed computation delay.
    pub avg_response_time_ms: f64,
    /// Energy consumed since the node started, in joules.
    pub energy_joules: f64,
    /// One-minute load average.
    pub load_average: f64,
}

impl NodeMetrics {
    /// Metrics with the given CPU and memory utilization and zeroes elsewhere.
    #[must_use]
    pub fn with_usage(cpu_percent: f64, memory_percent: f64) -> Self {
        Self {
            cpu_percent,
            memory_percent,
            ..Self::default()
        }
    }
}

/// Static host description reported alongside metrics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemInfo {
    /// Host name of the node process.
    pub hostname: String,
    /// Logical CPU count.
    pub cpu_count: u32,
    /// Total memory in megabytes.
    pub memory_total_mb: u64,
    /// Operating system / platform string.
    pub platform: String,
}

/// How the container serving an invocation was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStartKind {
    /// A brand-new container was created and started.
    Cold,
    /// A stopped container was reused.
    Warm,
    /// No invocation has been observed yet.
    #[default]
    Unknown,
}

impl ContainerStartKind {
    /// Lowercase name used in status output.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Warm => "warm",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ContainerStartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Health bucket derived from CPU and memory utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Both CPU and memory below the warning threshold.
    Healthy,
    /// Both below the unhealthy threshold, at least one at or above warning.
    Warning,
    /// CPU or memory at or above the unhealthy threshold.
    Unhealthy,
}

impl HealthStatus {
    /// Lowercase name used in status output.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Unhealthy => "unhealthy",
        }
    }

    /// Whether the node may receive new users or containers.
    #[must_use]
    pub const fn is_schedulable(&self) -> bool {
        !matches!(self, Self::Unhealthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
