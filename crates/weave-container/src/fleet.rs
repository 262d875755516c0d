//! Lifecycle managers for every node in the fabric.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use weave_core::NodeId;

use crate::error::ContainerId;
use crate::manager::{ContainerCounts, LifecycleConfig, LifecycleManager};
use crate::runtime::ContainerRuntime;
use crate::state::Container;

/// One [`LifecycleManager`] per node, created on first use.
#[derive(Debug)]
pub struct ContainerFleet {
    runtime: Option<Arc<dyn ContainerRuntime>>,
    config: LifecycleConfig,
    managers: BTreeMap<NodeId, LifecycleManager>,
}

impl ContainerFleet {
    /// Creates an empty fleet. Every node manager shares `runtime`.
    #[must_use]
    pub fn new(runtime: Option<Arc<dyn ContainerRuntime>>, config: LifecycleConfig) -> Self {
        Self {
            runtime,
            config,
            managers: BTreeMap::new(),
        }
    }

    /// Lifecycle configuration shared by all managers.
    #[must_use]
    pub const fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Manager for `node_id`, if one exists.
    #[must_use]
    pub fn manager(&self, node_id: &str) -> Option<&LifecycleManager> {
        self.managers.get(node_id)
    }

    /// Manager for `node_id`, created on first use.
    pub fn manager_mut(&mut self, node_id: &str) -> &mut LifecycleManager {
        let runtime = self.runtime.clone();
        let config = self.config.clone();
        self.managers
            .entry(node_id.to_string())
            .or_insert_with(|| LifecycleManager::new(node_id, runtime, config))
    }

    /// Live container counts for `node_id`.
    #[must_use]
    pub fn counts(&self, node_id: &str) -> ContainerCounts {
        self.managers
            .get(node_id)
            .map(LifecycleManager::counts)
            .unwrap_or_default()
    }

    /// Nodes with at least one live container.
    #[must_use]
    pub fn active_nodes(&self) -> Vec<NodeId> {
        self.managers
            .iter()
            .filter(|(_, m)| m.counts().total() > 0)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Finds the node currently owning a container.
    #[must_use]
    pub fn locate(&self, id: &ContainerId) -> Option<(&str, &Container)> {
        self.managers
            .iter()
            .find_map(|(node, m)| m.get(id).map(|c| (node.as_str(), c)))
    }

    /// Reaps expired warm containers on every node.
    pub async fn reap_at(&mut self, now: DateTime<Utc>) -> Vec<(NodeId, Container)> {
        let max_warm = self.config.max_warm_time_secs;
        let mut reaped = Vec::new();
        for (node_id, manager) in &mut self.managers {
            for container in manager.reap_at(max_warm, now).await {
                reaped.push((node_id.clone(), container));
            }
        }
        reaped
    }

    /// Drops a node's manager after evicting its containers.
    pub async fn decommission(&mut self, node_id: &str) -> Vec<Container> {
        let Some(mut manager) = self.managers.remove(node_id) else {
            return Vec::new();
        };
        let drained = manager.drain().await;
        if !drained.is_empty() {
            info!(node = node_id, count = drained.len(), "decommissioned node containers");
        }
        drained
    }
}
