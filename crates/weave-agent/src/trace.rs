//! Mobility trace feeds.
//!
//! A feed yields one batch of [`TraceStep`] rows per simulation step. Two
//! sources exist: a seeded random walk over a rectangular area, and replay
//! of a recorded trace stored as a JSON array of rows.

use std::collections::{BTreeMap, VecDeque};
use std::f64::consts::TAU;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use weave_core::Location;
use weave_scheduler::TraceStep;

use crate::config::SimulationConfig;
use crate::error::{FabricError, Result};

#[derive(Debug, Clone)]
struct Walker {
    id: String,
    location: Location,
}

/// Users wandering inside `[0, width] x [0, height]`.
#[derive(Debug)]
pub struct RandomWalkTrace {
    rng: StdRng,
    walkers: Vec<Walker>,
    width: f64,
    height: f64,
    max_step: f64,
    step_secs: f64,
    size: u64,
    timestep: u64,
}

impl RandomWalkTrace {
    /// Places `config.users` walkers uniformly at random.
    #[must_use]
    pub fn new(config: &SimulationConfig) -> Self {
        let mut rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let walkers = (0..config.users)
            .map(|i| Walker {
                id: format!("user-{i}"),
                location: Location::new(
                    rng.gen_range(0.0..=config.area_width),
                    rng.gen_range(0.0..=config.area_height),
                ),
            })
            .collect();
        Self {
            rng,
            walkers,
            width: config.area_width,
            height: config.area_height,
            max_step: config.max_step_distance,
            step_secs: config.step_secs,
            size: config.request_size_bytes,
            timestep: 0,
        }
    }

    /// Number of walkers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.walkers.len()
    }

    /// Whether there are no walkers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.walkers.is_empty()
    }

    /// Moves every walker once and returns their new rows.
    pub fn advance(&mut self) -> Vec<TraceStep> {
        let timestep = self.timestep;
        self.timestep += 1;
        let mut steps = Vec::with_capacity(self.walkers.len());
        for walker in &mut self.walkers {
            let heading = self.rng.gen_range(0.0..TAU);
            let distance = self.rng.gen_range(0.0..=self.max_step);
            let x = (walker.location.x + distance * heading.cos()).clamp(0.0, self.width);
            let y = (walker.location.y + distance * heading.sin()).clamp(0.0, self.height);
            let moved = walker.location.distance_to(&Location::new(x, y));
            walker.location = Location::new(x, y);
            steps.push(TraceStep {
                user_id: walker.id.clone(),
                x,
                y,
                size: self.size,
                speed: moved / self.step_secs,
                timestep,
            });
        }
        steps
    }
}

/// Recorded trace grouped by timestep.
#[derive(Debug, Clone, Default)]
pub struct TraceReplay {
    batches: VecDeque<Vec<TraceStep>>,
}

impl TraceReplay {
    /// Groups rows by ascending timestep, keeping row order within a step.
    #[must_use]
    pub fn from_steps(steps: Vec<TraceStep>) -> Self {
        let mut grouped: BTreeMap<u64, Vec<TraceStep>> = BTreeMap::new();
        for step in steps {
            grouped.entry(step.timestep).or_default().push(step);
        }
        Self {
            batches: grouped.into_values().collect(),
        }
    }

    /// Reads a JSON array of trace rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a row array.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FabricError::Trace(format!("failed to read trace '{}': {e}", path.display()))
        })?;
        let steps: Vec<TraceStep> = serde_json::from_str(&content)
            .map_err(|e| FabricError::Trace(format!("invalid trace '{}': {e}", path.display())))?;
        Ok(Self::from_steps(steps))
    }

    /// Remaining timesteps.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.batches.len()
    }
}

/// Where the simulation gets positions from.
#[derive(Debug)]
pub enum TraceFeed {
    /// Endless random walk.
    RandomWalk(RandomWalkTrace),
    /// Finite recorded trace.
    Replay(TraceReplay),
}

impl TraceFeed {
    /// Next batch of rows, `None` once a replay is exhausted.
    pub fn next_batch(&mut self) -> Option<Vec<TraceStep>> {
        match self {
            Self::RandomWalk(walk) => Some(walk.advance()),
            Self::Replay(replay) => replay.batches.pop_front(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn seeded(users: usize) -> SimulationConfig {
        SimulationConfig {
            users,
            seed: Some(7),
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_random_walk_is_reproducible() {
        let mut a = RandomWalkTrace::new(&seeded(5));
        let mut b = RandomWalkTrace::new(&seeded(5));
        for _ in 0..3 {
            assert_eq!(a.advance(), b.advance());
        }
    }

    #[test]
    fn test_random_walk_stays_in_area_and_step() {
        let config = seeded(10);
        let mut walk = RandomWalkTrace::new(&config);
        let mut previous = walk.advance();
        for expected_step in 1..50 {
            let steps = walk.advance();
            assert_eq!(steps.len(), 10);
            for (before, after) in previous.iter().zip(&steps) {
                assert_eq!(before.user_id, after.user_id);
                assert_eq!(after.timestep, expected_step);
                assert!((0.0..=config.area_width).contains(&after.x));
                assert!((0.0..=config.area_height).contains(&after.y));
                let moved = before.location().distance_to(&after.location());
                assert!(moved <= config.max_step_distance + 1e-9);
                assert!((after.speed - moved / config.step_secs).abs() < 1e-9);
            }
            previous = steps;
        }
    }

    #[test]
    fn test_replay_groups_by_timestep() {
        let row = |user: &str, t: u64| TraceStep {
            user_id: user.to_string(),
            x: 1.0,
            y: 2.0,
            size: 0,
            speed: 0.0,
            timestep: t,
        };
        let replay = TraceReplay::from_steps(vec![row("a", 2), row("b", 0), row("c", 2), row("d", 1)]);
        assert_eq!(replay.remaining(), 3);

        let mut feed = TraceFeed::Replay(replay);
        let ids = |batch: Vec<TraceStep>| batch.into_iter().map(|s| s.user_id).collect::<Vec<_>>();
        assert_eq!(ids(feed.next_batch().expect("t0")), vec!["b"]);
        assert_eq!(ids(feed.next_batch().expect("t1")), vec!["d"]);
        assert_eq!(ids(feed.next_batch().expect("t2")), vec!["a", "c"]);
        assert!(feed.next_batch().is_none());
    }

    #[test]
    fn test_replay_from_file() {
        let mut file = NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"[{{"user_id": "u1", "x": 10.0, "y": 20.0, "timestep": 0}},
                {{"user_id": "u1", "x": 12.0, "y": 20.0, "size": 512, "speed": 4.0, "timestep": 1}}]"#
        )
        .expect("write");

        let replay = TraceReplay::from_file(file.path()).expect("load");
        assert_eq!(replay.remaining(), 2);
    }

    #[test]
    fn test_replay_rejects_malformed_file() {
        let mut file = NamedTempFile::new().expect("tempfile");
        write!(file, r#"{{"user_id": "u1"}}"#).expect("write");
        let err = TraceReplay::from_file(file.path()).expect_err("not an array");
        assert!(matches!(err, FabricError::Trace(_)));
    }
}
