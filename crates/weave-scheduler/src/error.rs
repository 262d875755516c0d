//! Error types for the scheduler and node registry.

use thiserror::Error;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors that can occur in the scheduler.
///
/// Running out of capacity is not an error: scheduling returns
/// [`crate::Placement::NoNodesAvailable`] instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    /// Malformed registration, update or configuration payload.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Operation on an unknown node or user.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up ("node" or "user").
        kind: &'static str,
        /// The id that was not found.
        id: String,
    },

    /// Re-registration of a live node id.
    #[error("node already registered: {0}")]
    DuplicateNode(String),

    /// The configured solver has no implementation.
    #[error("unsupported GAP solver: {0}")]
    UnsupportedSolver(String),
}

impl SchedulerError {
    /// [`Self::NotFound`] for a node id.
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "node",
            id: id.into(),
        }
    }

    /// [`Self::NotFound`] for a user id.
    pub fn user_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "user",
            id: id.into(),
        }
    }
}
