//! Error types for migrations.

use thiserror::Error;
use weave_container::ContainerId;

use crate::types::{MigrationId, MigrationPhase, MigrationState};

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Errors that can occur in the migration manager.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MigrationError {
    /// The request failed validation.
    #[error("invalid migration request: {0}")]
    InvalidRequest(String),

    /// Unknown migration id.
    #[error("migration not found: {0}")]
    NotFound(MigrationId),

    /// Another non-terminal migration or an in-flight invocation holds the
    /// container.
    #[error("container {0} is busy")]
    ContainerBusy(ContainerId),

    /// The operation is not valid in the migration's current state.
    #[error("migration {id} is {actual}, expected {expected}")]
    InvalidState {
        /// Migration id.
        id: MigrationId,
        /// Current state.
        actual: MigrationState,
        /// State the operation requires.
        expected: MigrationState,
    },

    /// A phase failed. Recorded on the migration status.
    #[error("migration failed during {phase}: {cause}")]
    PhaseFailed {
        /// Failing phase.
        phase: MigrationPhase,
        /// Backend error message.
        cause: String,
    },
}
