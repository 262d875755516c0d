//! Shared value types for the Edgeweave edge/central serverless fabric.
//!
//! Everything in this crate is plain data or a pure function:
//!
//! - [`Location`], [`NodeMetrics`], [`SystemInfo`] describe nodes and users
//! - [`HealthStatus`] and [`ContainerStartKind`] are the small enums shared
//!   by the scheduler, the container manager and the migration manager
//! - [`latency`] converts planar distances and payload sizes into the
//!   propagation/transmission/computation delay breakdown

#![forbid(unsafe_code)]

pub mod latency;
pub mod types;

pub use latency::{
    DEFAULT_BANDWIDTH_BYTES_PER_MS, DEFAULT_METERS_PER_UNIT, Latency, SPEED_OF_LIGHT_M_PER_S,
    distance_meters, propagation_delay_ms, transmission_delay_ms,
};
pub use types::{
    CENTRAL_NODE_ID, ContainerStartKind, HealthStatus, Location, NodeId, NodeMetrics, SystemInfo,
};
