//! Assignment algorithms and the load predictor seam.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use weave_core::NodeId;

use crate::error::SchedulerError;

/// Process-wide user placement algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentAlgorithm {
    /// Nearest covering node.
    #[default]
    Greedy,
    /// Generalized-assignment latency model.
    Gap,
    /// Nearest node weighted by predicted load.
    Predictive,
}

impl AssignmentAlgorithm {
    /// Lowercase name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Greedy => "greedy",
            Self::Gap => "gap",
            Self::Predictive => "predictive",
        }
    }
}

impl std::fmt::Display for AssignmentAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AssignmentAlgorithm {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "greedy" => Ok(Self::Greedy),
            "gap" => Ok(Self::Gap),
            "predictive" => Ok(Self::Predictive),
            other => Err(SchedulerError::InvalidData(format!(
                "unknown assignment algorithm: {other}"
            ))),
        }
    }
}

/// Result of scheduling one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Placement {
    /// The user goes to `node_id`.
    Assigned {
        /// Target node.
        node_id: NodeId,
        /// Distance from the user to the node, in meters.
        distance_m: f64,
        /// Algorithm-specific cost of the placement.
        cost: f64,
    },
    /// No schedulable node exists.
    NoNodesAvailable,
}

impl Placement {
    /// Target node id, if assigned.
    #[must_use]
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::Assigned { node_id, .. } => Some(node_id),
            Self::NoNodesAvailable => None,
        }
    }
}

/// Forecast for one node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadPrediction {
    /// Predicted load in percent.
    pub predicted_load: f64,
    /// Lower and upper bound of the prediction.
    pub confidence_interval: (f64, f64),
}

/// Source of per-node load forecasts.
pub trait LoadPredictor: Send + Sync + std::fmt::Debug {
    /// Predicted load of `node_id` `horizon_minutes` ahead, if known.
    fn predict(&self, node_id: &str, horizon_minutes: u32) -> Option<LoadPrediction>;
}

/// Predictor returning fixed per-node loads.
#[derive(Debug, Clone, Default)]
pub struct StaticLoadPredictor {
    loads: HashMap<NodeId, f64>,
}

impl StaticLoadPredictor {
    /// Creates a predictor with no known nodes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the load reported for `node_id`.
    #[must_use]
    pub fn with_load(mut self, node_id: impl Into<NodeId>, load_percent: f64) -> Self {
        self.loads.insert(node_id.into(), load_percent);
        self
    }
}

impl LoadPredictor for StaticLoadPredictor {
    fn predict(&self, node_id: &str, _horizon_minutes: u32) -> Option<LoadPrediction> {
        self.loads.get(node_id).map(|load| LoadPrediction {
            predicted_load: *load,
            confidence_interval: (*load, *load),
        })
    }
}

/// Distance penalty applied for a predicted load.
///
/// A node at 100% load costs twice its distance.
#[must_use]
pub fn load_weight(prediction: Option<LoadPrediction>) -> f64 {
    prediction.map_or(1.0, |p| 1.0 + p.predicted_load.clamp(0.0, 100.0) / 100.0)
}
