//! Phased container migration for Edgeweave.
//!
//! A migration moves one container from a source node to a target node
//! through five ordered phases:
//!
//! ```text
//! prepare target -> create on target -> transfer state -> start on target -> cleanup source
//!      0.3               0.5                 0.7                0.9               1.0
//! ```
//!
//! Execution reports `0.1` as soon as it starts. A failing phase ends the
//! migration as `failed`, records the phase and the cause, and triggers a
//! best-effort rollback. Progress never decreases.
//!
//! [`MigrationManager`] owns the protocol and bookkeeping; the phase bodies
//! come from a [`MigrationBackend`]. [`FleetBackend`] is the backend that
//! drives the lifecycle managers of a [`weave_container::ContainerFleet`].

#![forbid(unsafe_code)]

pub mod backend;
pub mod error;
pub mod history;
pub mod manager;
pub mod types;

pub use backend::{FleetBackend, MigrationBackend};
pub use error::{MigrationError, Result};
pub use history::{DEFAULT_HISTORY_LIMIT, MigrationHistory};
pub use manager::{MigrationConfig, MigrationManager};
pub use types::{
    INITIAL_PROGRESS, MigrationId, MigrationPhase, MigrationReason, MigrationRequest,
    MigrationState, MigrationStats, MigrationStatus,
};
