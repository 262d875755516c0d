//! Handoff hysteresis.
//!
//! A user moves to a better node only when it has stayed on its current
//! node for a minimum dwell time and the candidate is better by more than a
//! relative margin. Both gates must pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Dwell and improvement gates for reassignment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffPolicy {
    /// Minimum time between two handoffs of the same user.
    pub min_dwell_secs: f64,
    /// Relative cost improvement that must be exceeded, as a fraction.
    pub improvement_threshold: f64,
}

impl Default for HandoffPolicy {
    fn default() -> Self {
        Self {
            min_dwell_secs: 1.0,
            improvement_threshold: 0.1,
        }
    }
}

/// Why a user stays where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    /// The last handoff is too recent.
    DwellNotElapsed,
    /// The candidate is not enough of an improvement.
    InsufficientImprovement,
}

/// Outcome of a handoff evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HandoffDecision {
    /// Move to the candidate. Carries the relative improvement.
    Switch(f64),
    /// Keep the current assignment.
    Stay(HoldReason),
}

impl HandoffPolicy {
    /// Whether the dwell time has elapsed. A user never handed off is always
    /// eligible.
    #[must_use]
    pub fn dwell_elapsed(&self, last_handoff_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        last_handoff_at.is_none_or(|at| {
            #[allow(clippy::cast_precision_loss)]
            let elapsed = (now - at).num_milliseconds() as f64 / 1000.0;
            elapsed >= self.min_dwell_secs
        })
    }

    /// Relative improvement of `candidate_cost` over `current_cost`.
    ///
    /// An infinite current cost (current node lost coverage or health)
    /// counts as a full improvement for any finite candidate.
    #[must_use]
    pub fn improvement(current_cost: f64, candidate_cost: f64) -> f64 {
        if current_cost.is_infinite() {
            return if candidate_cost.is_finite() { 1.0 } else { 0.0 };
        }
        if current_cost <= 0.0 {
            return 0.0;
        }
        (current_cost - candidate_cost) / current_cost
    }

    /// Evaluates both gates.
    #[must_use]
    pub fn decide(
        &self,
        last_handoff_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        current_cost: f64,
        candidate_cost: f64,
    ) -> HandoffDecision {
        if !self.dwell_elapsed(last_handoff_at, now) {
            return HandoffDecision::Stay(HoldReason::DwellNotElapsed);
        }
        let improvement = Self::improvement(current_cost, candidate_cost);
        if improvement > self.improvement_threshold {
            HandoffDecision::Switch(improvement)
        } else {
            HandoffDecision::Stay(HoldReason::InsufficientImprovement)
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.min_dwell_secs.is_finite() && self.min_dwell_secs >= 0.0) {
            return Err(SchedulerError::InvalidData(
                "min_dwell_secs must be non-negative".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.improvement_threshold) {
            return Err(SchedulerError::InvalidData(
                "improvement_threshold must be within [0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}
