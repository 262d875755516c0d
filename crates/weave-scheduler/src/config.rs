//! Scheduler configuration.

use serde::{Deserialize, Serialize};
use weave_core::{DEFAULT_BANDWIDTH_BYTES_PER_MS, DEFAULT_METERS_PER_UNIT, Location};

use crate::error::{Result, SchedulerError};
use crate::gap::GapConfig;
use crate::health::HealthThresholds;
use crate::hysteresis::HandoffPolicy;
use crate::strategy::AssignmentAlgorithm;

/// Where the singleton central node lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralNodeConfig {
    /// Endpoint advertised for the central node.
    pub endpoint: String,
    /// Fixed location of the central node.
    pub location: Location,
}

impl Default for CentralNodeConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://central:8000".to_string(),
            location: Location::new(600.0, 400.0),
        }
    }
}

/// Configuration for the node registry and user scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Algorithm used for new placements and reassignment scans.
    pub algorithm: AssignmentAlgorithm,

    /// Meters represented by one simulation unit.
    pub meters_per_unit: f64,

    /// Link bandwidth used for transmission delay, in bytes per millisecond.
    pub bandwidth_bytes_per_ms: f64,

    /// Coverage radius given to edge nodes that register without one.
    pub default_coverage_radius: f64,

    /// Location given to edge nodes that register without one.
    pub default_edge_location: Location,

    /// Edge nodes silent for longer than this are evicted.
    pub heartbeat_timeout_secs: f64,

    /// Users not updated for longer than this are removed.
    pub user_ttl_secs: f64,

    /// Horizon passed to the load predictor, in minutes.
    pub prediction_horizon_minutes: u32,

    /// Health classification thresholds.
    pub health: HealthThresholds,

    /// Handoff hysteresis.
    pub handoff: HandoffPolicy,

    /// GAP latency model.
    pub gap: GapConfig,

    /// Central node placement.
    pub central: CentralNodeConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            algorithm: AssignmentAlgorithm::default(),
            meters_per_unit: DEFAULT_METERS_PER_UNIT,
            bandwidth_bytes_per_ms: DEFAULT_BANDWIDTH_BYTES_PER_MS,
            default_coverage_radius: 300.0,
            default_edge_location: Location::default(),
            heartbeat_timeout_secs: 10.0,
            user_ttl_secs: 2.0,
            prediction_horizon_minutes: 5,
            health: HealthThresholds::default(),
            handoff: HandoffPolicy::default(),
            gap: GapConfig::default(),
            central: CentralNodeConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if !(self.meters_per_unit.is_finite() && self.meters_per_unit > 0.0) {
            return Err(invalid("meters_per_unit must be positive"));
        }
        if !(self.bandwidth_bytes_per_ms.is_finite() && self.bandwidth_bytes_per_ms > 0.0) {
            return Err(invalid("bandwidth_bytes_per_ms must be positive"));
        }
        if !(self.default_coverage_radius.is_finite() && self.default_coverage_radius >= 0.0) {
            return Err(invalid("default_coverage_radius must be non-negative"));
        }
        if !self.default_edge_location.is_finite() || !self.central.location.is_finite() {
            return Err(invalid("locations must be finite"));
        }
        if self.heartbeat_timeout_secs <= 0.0 {
            return Err(invalid("heartbeat_timeout_secs must be positive"));
        }
        if self.user_ttl_secs <= 0.0 {
            return Err(invalid("user_ttl_secs must be positive"));
        }
        self.health.validate()?;
        self.handoff.validate()?;
        self.gap.validate()?;
        Ok(())
    }
}

fn invalid(msg: &str) -> SchedulerError {
    SchedulerError::InvalidData(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.central.location, Location::new(600.0, 400.0));
        assert!((config.heartbeat_timeout_secs - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"algorithm":"gap","user_ttl_secs":4.0}"#).expect("parse");
        assert_eq!(config.algorithm, AssignmentAlgorithm::Gap);
        assert!((config.user_ttl_secs - 4.0).abs() < f64::EPSILON);
        assert!((config.default_coverage_radius - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = SchedulerConfig::default();
        config.meters_per_unit = 0.0;
        assert!(config.validate().is_err());

        let mut config = SchedulerConfig::default();
        config.heartbeat_timeout_secs = -1.0;
        assert!(config.validate().is_err());

        let mut config = SchedulerConfig::default();
        config.health.warning_percent = 95.0;
        assert!(config.validate().is_err());
    }
}
