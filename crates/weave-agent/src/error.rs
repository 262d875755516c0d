//! Error types for the fabric agent.

use thiserror::Error;
use weave_container::ContainerError;
use weave_migration::MigrationError;
use weave_scheduler::SchedulerError;

/// Errors surfaced by the fabric actor and its callers.
#[derive(Debug, Error)]
pub enum FabricError {
    /// Scheduling or registry failure.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Container lifecycle failure.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// Migration failure.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// The actor has stopped or dropped the reply.
    #[error("fabric actor unavailable")]
    ActorUnavailable,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed trace input.
    #[error("invalid trace: {0}")]
    Trace(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for fabric operations.
pub type Result<T> = std::result::Result<T, FabricError>;

impl FabricError {
    /// Whether retrying against the same actor can never succeed.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ActorUnavailable)
    }
}
