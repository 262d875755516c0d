//! Phase bodies for migrations.
//!
//! The manager owns the phase protocol; a [`MigrationBackend`] does the
//! actual work of each phase. [`FleetBackend`] moves containers between the
//! lifecycle managers of a [`ContainerFleet`].

use tracing::{debug, warn};
use weave_container::{ContainerError, ContainerFleet, ContainerId, ContainerResult, ContainerState};

use crate::types::MigrationStatus;

/// Work performed for each migration phase.
///
/// Every method receives the migration as it stands when the phase starts.
pub trait MigrationBackend: Send {
    /// Check the target can host the container.
    fn prepare_target(
        &mut self,
        migration: &MigrationStatus,
    ) -> impl std::future::Future<Output = ContainerResult<()>> + Send;

    /// Create the replacement container and return its id.
    fn create_on_target(
        &mut self,
        migration: &MigrationStatus,
    ) -> impl std::future::Future<Output = ContainerResult<ContainerId>> + Send;

    /// Move state from the original to the replacement.
    fn transfer_state(
        &mut self,
        migration: &MigrationStatus,
    ) -> impl std::future::Future<Output = ContainerResult<()>> + Send;

    /// Start the replacement.
    fn start_on_target(
        &mut self,
        migration: &MigrationStatus,
    ) -> impl std::future::Future<Output = ContainerResult<()>> + Send;

    /// Remove the original.
    fn cleanup_source(
        &mut self,
        migration: &MigrationStatus,
    ) -> impl std::future::Future<Output = ContainerResult<()>> + Send;

    /// Undo whatever the completed phases left on the target.
    fn rollback(
        &mut self,
        migration: &MigrationStatus,
    ) -> impl std::future::Future<Output = ContainerResult<()>> + Send;
}

/// Backend driving the per-node lifecycle managers.
#[derive(Debug)]
pub struct FleetBackend<'a> {
    fleet: &'a mut ContainerFleet,
}

impl<'a> FleetBackend<'a> {
    /// Wraps a fleet.
    pub fn new(fleet: &'a mut ContainerFleet) -> Self {
        Self { fleet }
    }

    fn source_state(&self, migration: &MigrationStatus) -> ContainerResult<ContainerState> {
        let request = &migration.request;
        self.fleet
            .manager(&request.source_node_id)
            .and_then(|m| m.get(&request.container_id))
            .map(|c| c.state)
            .ok_or_else(|| ContainerError::NotFound {
                id: request.container_id.as_str().to_string(),
            })
    }

    fn target_container(migration: &MigrationStatus) -> ContainerResult<&ContainerId> {
        migration
            .target_container_id
            .as_ref()
            .ok_or_else(|| ContainerError::Runtime {
                id: migration.request.container_id.as_str().to_string(),
                reason: "no replacement container on target".to_string(),
            })
    }
}

impl MigrationBackend for FleetBackend<'_> {
    async fn prepare_target(&mut self, migration: &MigrationStatus) -> ContainerResult<()> {
        if self.source_state(migration)? == ContainerState::Running {
            return Err(ContainerError::Runtime {
                id: migration.request.container_id.as_str().to_string(),
                reason: "container is serving an invocation".to_string(),
            });
        }
        self.fleet
            .manager_mut(&migration.request.target_node_id)
            .ping()
            .await
    }

    async fn create_on_target(&mut self, migration: &MigrationStatus) -> ContainerResult<ContainerId> {
        let request = &migration.request;
        let (name, image, limits) = self
            .fleet
            .manager(&request.source_node_id)
            .and_then(|m| m.get(&request.container_id))
            .map(|c| (c.name.clone(), c.image.clone(), c.limits))
            .ok_or_else(|| ContainerError::NotFound {
                id: request.container_id.as_str().to_string(),
            })?;
        self.fleet
            .manager_mut(&request.target_node_id)
            .create(&name, &image, limits)
            .await
    }

    async fn transfer_state(&mut self, migration: &MigrationStatus) -> ContainerResult<()> {
        let target = Self::target_container(migration)?;
        let state = self.source_state(migration)?;
        debug!(
            migration = %migration.id,
            source = %migration.request.container_id,
            target = %target,
            source_state = %state,
            "container state transferred"
        );
        Ok(())
    }

    async fn start_on_target(&mut self, migration: &MigrationStatus) -> ContainerResult<()> {
        let target = Self::target_container(migration)?.clone();
        let manager = self.fleet.manager_mut(&migration.request.target_node_id);
        manager.start(&target).await?;
        // No invocation holds the replacement, so it parks warm.
        manager.mark_warm(&target).await
    }

    async fn cleanup_source(&mut self, migration: &MigrationStatus) -> ContainerResult<()> {
        let request = &migration.request;
        self.fleet
            .manager_mut(&request.source_node_id)
            .evict(&request.container_id)
            .await
            .map(|_| ())
    }

    async fn rollback(&mut self, migration: &MigrationStatus) -> ContainerResult<()> {
        let Some(target) = migration.target_container_id.as_ref() else {
            return Ok(());
        };
        match self
            .fleet
            .manager_mut(&migration.request.target_node_id)
            .evict(target)
            .await
        {
            Ok(_) | Err(ContainerError::NotFound { .. }) => Ok(()),
            Err(e) => {
                warn!(migration = %migration.id, container = %target, error = %e, "rollback eviction failed");
                Err(e)
            }
        }
    }
}
