//! Latency and distance model.
//!
//! Turnaround time for one invocation is the sum of three components:
//!
//! | Component | Source |
//! |-----------|--------|
//! | propagation | `distance_m / c` |
//! | transmission | `data_size / bandwidth` |
//! | computation | measured execution wall-clock time |
//!
//! [`Latency`] keeps the breakdown and recomputes the total on every
//! mutation, so callers never observe a stale `total_turnaround_ms`.

use serde::{Deserialize, Serialize};

use crate::types::{ContainerStartKind, Location};

/// Speed of light in vacuum, meters per second.
pub const SPEED_OF_LIGHT_M_PER_S: f64 = 299_792_458.0;

/// Default scale from simulation units (map pixels) to meters.
pub const DEFAULT_METERS_PER_UNIT: f64 = 10.0;

/// Default link bandwidth: 100 Mbit/s expressed in bytes per millisecond.
pub const DEFAULT_BANDWIDTH_BYTES_PER_MS: f64 = 12_500.0;

/// Distance between two locations in meters.
#[must_use]
pub fn distance_meters(a: &Location, b: &Location, meters_per_unit: f64) -> f64 {
    a.distance_to(b) * meters_per_unit
}

/// One-way propagation delay over `distance_m` meters, in milliseconds.
#[must_use]
pub fn propagation_delay_ms(distance_m: f64) -> f64 {
    distance_m / SPEED_OF_LIGHT_M_PER_S * 1000.0
}

/// Time to push `data_bytes` through a link, in milliseconds.
///
/// A non-positive bandwidth means the link is not modelled and yields zero.
#[must_use]
pub fn transmission_delay_ms(data_bytes: u64, bandwidth_bytes_per_ms: f64) -> f64 {
    if bandwidth_bytes_per_ms <= 0.0 {
        return 0.0;
    }
    data_bytes as f64 / bandwidth_bytes_per_ms
}

/// Per-user latency breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Latency {
    /// Distance to the assigned node in meters.
    pub distance: f64,
    /// Request payload size in bytes.
    pub data_size: u64,
    /// Link bandwidth in bytes per millisecond.
    pub bandwidth: f64,
    /// Propagation component.
    pub propagation_delay_ms: f64,
    /// Transmission component.
    pub transmission_delay_ms: f64,
    /// Computation component from the last execution.
    pub computation_delay_ms: f64,
    /// Start kind of the container that served the last execution.
    pub container_start: ContainerStartKind,
    /// Sum of the three delay components.
    pub total_turnaround_ms: f64,
}

impl Default for Latency {
    fn default() -> Self {
        Self::new(0.0, 0, DEFAULT_BANDWIDTH_BYTES_PER_MS)
    }
}

impl Latency {
    /// Builds a breakdown with no execution observed yet.
    #[must_use]
    pub fn new(distance_m: f64, data_size: u64, bandwidth: f64) -> Self {
        let mut latency = Self {
            distance: distance_m,
            data_size,
            bandwidth,
            propagation_delay_ms: 0.0,
            transmission_delay_ms: 0.0,
            computation_delay_ms: 0.0,
            container_start: ContainerStartKind::Unknown,
            total_turnaround_ms: 0.0,
        };
        latency.recompute();
        latency
    }

    /// Updates the distance after a move or reassignment.
    pub fn set_distance(&mut self, distance_m: f64) {
        self.distance = distance_m;
        self.recompute();
    }

    /// Updates the request payload size.
    pub fn set_data_size(&mut self, data_size: u64) {
        self.data_size = data_size;
        self.recompute();
    }

    /// Records a completed execution.
    pub fn record_execution(&mut self, computation_ms: f64, start: ContainerStartKind) {
        self.computation_delay_ms = computation_ms.max(0.0);
        self.container_start = start;
        self.recompute();
    }

    fn recompute(&mut self) {
        self.propagation_delay_ms = propagation_delay_ms(self.distance);
        self.transmission_delay_ms = transmission_delay_ms(self.data_size, self.bandwidth);
        self.total_turnaround_ms =
            self.propagation_delay_ms + self.transmission_delay_ms + self.computation_delay_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_distance_meters_scales() {
        let a = Location::new(0.0, 0.0);
        let b = Location::new(30.0, 40.0);
        assert!(approx(distance_meters(&a, &b, 10.0), 500.0));
        assert!(approx(distance_meters(&a, &b, 1.0), 50.0));
    }

    #[test]
    fn test_propagation_delay() {
        // 299.792458 km takes exactly one millisecond
        assert!(approx(propagation_delay_ms(299_792.458), 1.0));
        assert!(approx(propagation_delay_ms(0.0), 0.0));
    }

    #[test_case(12_500, 12_500.0, 1.0 ; "one millisecond of data")]
    #[test_case(0, 12_500.0, 0.0 ; "empty payload")]
    #[test_case(1_000, 0.0, 0.0 ; "unmodelled link")]
    #[test_case(1_000, -5.0, 0.0 ; "negative bandwidth")]
    fn test_transmission_delay(bytes: u64, bandwidth: f64, expected: f64) {
        assert!(approx(transmission_delay_ms(bytes, bandwidth), expected));
    }

    #[test]
    fn test_latency_recomputes_on_every_mutation() {
        let mut latency = Latency::new(299_792.458, 12_500, 12_500.0);
        assert!(approx(latency.total_turnaround_ms, 2.0));

        latency.record_execution(40.0, ContainerStartKind::Cold);
        assert!(approx(latency.total_turnaround_ms, 42.0));
        assert_eq!(latency.container_start, ContainerStartKind::Cold);

        latency.set_data_size(25_000);
        assert!(approx(latency.transmission_delay_ms, 2.0));
        assert!(approx(latency.total_turnaround_ms, 43.0));

        latency.set_distance(0.0);
        assert!(approx(latency.total_turnaround_ms, 42.0));
    }

    #[test]
    fn test_negative_computation_clamped() {
        let mut latency = Latency::default();
        latency.record_execution(-3.0, ContainerStartKind::Warm);
        assert!(approx(latency.computation_delay_ms, 0.0));
    }

    proptest! {
        #[test]
        fn total_is_sum_of_components(
            distance in 0.0f64..1.0e7,
            bytes in 0u64..10_000_000,
            compute in 0.0f64..10_000.0,
        ) {
            let mut latency = Latency::new(distance, bytes, DEFAULT_BANDWIDTH_BYTES_PER_MS);
            latency.record_execution(compute, ContainerStartKind::Warm);
            let sum = latency.propagation_delay_ms
                + latency.transmission_delay_ms
                + latency.computation_delay_ms;
            prop_assert!((latency.total_turnaround_ms - sum).abs() < 1e-6);
        }
    }
}
