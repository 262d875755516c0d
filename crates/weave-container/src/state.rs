//! Container state and record types.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ContainerId;
use crate::spec::ResourceLimits;

/// Container lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContainerState {
    /// Created but not started.
    Init,

    /// Started and executing a function.
    Running,

    /// Stopped after use, eligible for reuse.
    Warm,

    /// Removed. Terminal.
    Dead,
}

impl ContainerState {
    /// Check whether the lifecycle allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Running)
                | (Self::Running, Self::Warm)
                | (Self::Warm, Self::Running)
                | (Self::Init | Self::Running | Self::Warm, Self::Dead)
        )
    }

    /// Check if container is still part of the live set.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        !matches!(self, Self::Dead)
    }

    /// Get state name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Running => "RUNNING",
            Self::Warm => "WARM",
            Self::Dead => "DEAD",
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A function container owned by one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    /// Container ID.
    pub id: ContainerId,

    /// Function the container currently serves.
    pub name: String,

    /// Image the container was created from.
    pub image: String,

    /// Resource limits applied at creation.
    pub limits: ResourceLimits,

    /// Current lifecycle state.
    pub state: ContainerState,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Last time the container entered `RUNNING`.
    pub started_at: Option<DateTime<Utc>>,

    /// Last time the container entered `WARM` or `DEAD`.
    pub stopped_at: Option<DateTime<Utc>>,

    /// Number of invocations served.
    pub invocations: u64,
}

impl Container {
    pub(crate) fn new(
        id: ContainerId,
        name: impl Into<String>,
        image: impl Into<String>,
        limits: ResourceLimits,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            image: image.into(),
            limits,
            state: ContainerState::Init,
            created_at: now,
            started_at: None,
            stopped_at: None,
            invocations: 0,
        }
    }

    /// Time spent in `WARM` as of `now`. `None` unless the container is warm.
    #[must_use]
    pub fn idle_for(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        match (self.state, self.stopped_at) {
            (ContainerState::Warm, Some(stopped)) => Some(now - stopped),
            _ => None,
        }
    }
}
