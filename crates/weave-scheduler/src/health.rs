//! Node health classification.

use serde::{Deserialize, Serialize};
use weave_core::{HealthStatus, NodeId, NodeMetrics};

use crate::error::{Result, SchedulerError};

/// CPU/memory thresholds, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// At or above this a node is at least `warning`.
    pub warning_percent: f64,
    /// At or above this a node is `unhealthy`.
    pub unhealthy_percent: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            warning_percent: 70.0,
            unhealthy_percent: 90.0,
        }
    }
}

impl HealthThresholds {
    /// Classifies one metrics snapshot.
    #[must_use]
    pub fn classify(&self, metrics: &NodeMetrics) -> HealthStatus {
        let peak = metrics.cpu_percent.max(metrics.memory_percent);
        if peak < self.warning_percent {
            HealthStatus::Healthy
        } else if peak < self.unhealthy_percent {
            HealthStatus::Warning
        } else {
            HealthStatus::Unhealthy
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_range(self.warning_percent) || !in_range(self.unhealthy_percent) {
            return Err(SchedulerError::InvalidData(
                "health thresholds must be within 0-100".to_string(),
            ));
        }
        if self.warning_percent >= self.unhealthy_percent {
            return Err(SchedulerError::InvalidData(
                "warning threshold must be below unhealthy threshold".to_string(),
            ));
        }
        Ok(())
    }
}

/// Number of nodes in each health bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCounts {
    /// Healthy nodes.
    pub healthy: usize,
    /// Nodes in the warning band.
    pub warning: usize,
    /// Unhealthy nodes.
    pub unhealthy: usize,
}

/// Node ids partitioned by health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHealthReport {
    /// Healthy node ids.
    pub healthy: Vec<NodeId>,
    /// Warning node ids.
    pub warning: Vec<NodeId>,
    /// Unhealthy node ids.
    pub unhealthy: Vec<NodeId>,
}

impl NodeHealthReport {
    /// Partitions `nodes` with `thresholds`, preserving input order.
    pub fn classify<'a>(
        thresholds: &HealthThresholds,
        nodes: impl IntoIterator<Item = (&'a str, &'a NodeMetrics)>,
    ) -> Self {
        let mut report = Self::default();
        for (id, metrics) in nodes {
            let bucket = match thresholds.classify(metrics) {
                HealthStatus::Healthy => &mut report.healthy,
                HealthStatus::Warning => &mut report.warning,
                HealthStatus::Unhealthy => &mut report.unhealthy,
            };
            bucket.push(id.to_string());
        }
        report
    }

    /// Bucket sizes.
    #[must_use]
    pub fn counts(&self) -> HealthCounts {
        HealthCounts {
            healthy: self.healthy.len(),
            warning: self.warning.len(),
            unhealthy: self.unhealthy.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(10.0, 10.0 => HealthStatus::Healthy ; "idle")]
    #[test_case(69.9, 69.9 => HealthStatus::Healthy ; "just below warning")]
    #[test_case(70.0, 10.0 => HealthStatus::Warning ; "cpu at warning")]
    #[test_case(10.0, 85.0 => HealthStatus::Warning ; "memory in warning band")]
    #[test_case(89.9, 89.9 => HealthStatus::Warning ; "just below unhealthy")]
    #[test_case(90.0, 10.0 => HealthStatus::Unhealthy ; "cpu at unhealthy")]
    #[test_case(10.0, 99.0 => HealthStatus::Unhealthy ; "memory exhausted")]
    fn test_classify(cpu: f64, mem: f64) -> HealthStatus {
        HealthThresholds::default().classify(&NodeMetrics::with_usage(cpu, mem))
    }

    #[test]
    fn test_report_partitions_in_order() {
        let a = NodeMetrics::with_usage(10.0, 10.0);
        let b = NodeMetrics::with_usage(95.0, 10.0);
        let c = NodeMetrics::with_usage(75.0, 10.0);
        let d = NodeMetrics::with_usage(20.0, 20.0);
        let report = NodeHealthReport::classify(
            &HealthThresholds::default(),
            [("a", &a), ("b", &b), ("c", &c), ("d", &d)],
        );
        assert_eq!(report.healthy, vec!["a", "d"]);
        assert_eq!(report.warning, vec!["c"]);
        assert_eq!(report.unhealthy, vec!["b"]);
        assert_eq!(
            report.counts(),
            HealthCounts {
                healthy: 2,
                warning: 1,
                unhealthy: 1
            }
        );
    }

    #[test]
    fn test_thresholds_validation() {
        assert!(HealthThresholds::default().validate().is_ok());
        let inverted = HealthThresholds {
            warning_percent: 90.0,
            unhealthy_percent: 70.0,
        };
        assert!(inverted.validate().is_err());
    }
}
