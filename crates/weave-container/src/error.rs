//! Container lifecycle error types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::ContainerState;

/// Container lifecycle errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ContainerError {
    /// No runtime handle is attached, or the runtime refused the call.
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// Container not found in the live set.
    #[error("container not found: {id}")]
    NotFound {
        /// Container ID.
        id: String,
    },

    /// The requested state change is not part of the lifecycle.
    #[error("invalid transition for container {id}: {from} -> {to}")]
    InvalidTransition {
        /// Container ID.
        id: String,
        /// Current state.
        from: ContainerState,
        /// Requested state.
        to: ContainerState,
    },

    /// Invalid container specification.
    #[error("invalid container specification: {0}")]
    InvalidSpec(String),

    /// The runtime accepted the call but the operation failed.
    #[error("runtime operation failed for {id}: {reason}")]
    Runtime {
        /// Container ID.
        id: String,
        /// Failure reason.
        reason: String,
    },
}

/// Result type for container operations.
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// Container ID wrapper for type safety.
///
/// Ids are UUID based, so an id retired with its container is never handed
/// out again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Create a container ID from a string.
    ///
    /// # Errors
    ///
    /// Returns error if ID is empty or contains invalid characters.
    pub fn new(id: impl Into<String>) -> ContainerResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ContainerError::InvalidSpec(
                "container ID cannot be empty".to_string(),
            ));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(ContainerError::InvalidSpec(format!(
                "invalid container ID: {id}"
            )));
        }
        Ok(Self(id))
    }

    /// Generate a fresh, never-before-used ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        id.0
    }
}
