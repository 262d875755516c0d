//! Node and user registry.
//!
//! The registry owns the central node, the live edge nodes and every user,
//! and is the only place assignments change. It is not synchronized: the
//! fabric actor owns exactly one instance and serializes access to it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use weave_core::{
    CENTRAL_NODE_ID, ContainerStartKind, HealthStatus, Latency, Location, NodeId, distance_meters,
};

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::gap::{GapAssignment, GapNode, GapSolver, GapUser, NodeType};
use crate::health::NodeHealthReport;
use crate::hysteresis::HandoffDecision;
use crate::status::{ClusterStatus, NodeSummary, UserSummary};
use crate::strategy::{AssignmentAlgorithm, LoadPredictor, Placement, load_weight};
use crate::types::{
    EdgeNodeRegistration, Handoff, MetricsReport, MetricsUpsert, Node, NodeKind, TraceStep,
    UserNode, UserSpec, require_location,
};

/// Smoothing factor for the per-node response time average.
const RESPONSE_TIME_ALPHA: f64 = 0.2;

/// Registry of nodes and users.
#[derive(Debug)]
pub struct NodeRegistry {
    config: SchedulerConfig,
    algorithm: AssignmentAlgorithm,
    solver: GapSolver,
    predictor: Option<Arc<dyn LoadPredictor>>,
    central: Node,
    edges: BTreeMap<NodeId, Node>,
    users: BTreeMap<String, UserNode>,
}

impl NodeRegistry {
    /// Creates a registry holding only the central node.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self::new_at(config, Utc::now())
    }

    /// Creates a registry with the central node heartbeat set to `now`.
    #[must_use]
    pub fn new_at(config: SchedulerConfig, now: DateTime<Utc>) -> Self {
        let central = Node {
            id: CENTRAL_NODE_ID.to_string(),
            kind: NodeKind::Central,
            endpoint: config.central.endpoint.clone(),
            location: config.central.location,
            coverage_radius: 0.0,
            last_heartbeat: now,
            registered_at: now,
            metrics: weave_core::NodeMetrics::default(),
            system_info: weave_core::SystemInfo::default(),
        };
        Self {
            algorithm: config.algorithm,
            solver: GapSolver::new(config.gap),
            predictor: None,
            central,
            edges: BTreeMap::new(),
            users: BTreeMap::new(),
            config,
        }
    }

    /// Installs a load predictor for the predictive algorithm.
    #[must_use]
    pub fn with_predictor(mut self, predictor: Arc<dyn LoadPredictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    /// Replaces the load predictor.
    pub fn set_predictor(&mut self, predictor: Option<Arc<dyn LoadPredictor>>) {
        self.predictor = predictor;
    }

    /// Registry configuration.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Active placement algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> AssignmentAlgorithm {
        self.algorithm
    }

    /// Switches the placement algorithm, returning the previous one.
    ///
    /// Existing assignments are left alone; the next reassignment scan
    /// evaluates them under the new algorithm.
    pub fn set_algorithm(&mut self, algorithm: AssignmentAlgorithm) -> AssignmentAlgorithm {
        let previous = std::mem::replace(&mut self.algorithm, algorithm);
        if previous != algorithm {
            info!(from = %previous, to = %algorithm, "assignment algorithm changed");
        }
        previous
    }

    /// The central node.
    #[must_use]
    pub const fn central(&self) -> &Node {
        &self.central
    }

    /// Any node by id, central included.
    #[must_use]
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        if node_id == CENTRAL_NODE_ID {
            Some(&self.central)
        } else {
            self.edges.get(node_id)
        }
    }

    fn node_mut(&mut self, node_id: &str) -> Option<&mut Node> {
        if node_id == CENTRAL_NODE_ID {
            Some(&mut self.central)
        } else {
            self.edges.get_mut(node_id)
        }
    }

    /// Live edge nodes in id order.
    pub fn edges(&self) -> impl Iterator<Item = &Node> {
        self.edges.values()
    }

    /// Number of live edge nodes.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// User by id.
    #[must_use]
    pub fn user(&self, user_id: &str) -> Option<&UserNode> {
        self.users.get(user_id)
    }

    /// Users in id order.
    pub fn users(&self) -> impl Iterator<Item = &UserNode> {
        self.users.values()
    }

    /// Number of users.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of users assigned to `node_id`.
    #[must_use]
    pub fn users_on(&self, node_id: &str) -> usize {
        self.users
            .values()
            .filter(|u| u.assigned_node_id == node_id)
            .count()
    }

    // ---- nodes ----

    /// Registers a new edge node.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidData`] for a malformed registration
    /// and [`SchedulerError::DuplicateNode`] if the id is already live.
    pub fn register_edge_node(&mut self, registration: EdgeNodeRegistration) -> Result<()> {
        self.register_edge_node_at(registration, Utc::now())
    }

    /// Registers a new edge node with its heartbeat set to `now`.
    ///
    /// # Errors
    ///
    /// See [`Self::register_edge_node`].
    pub fn register_edge_node_at(
        &mut self,
        registration: EdgeNodeRegistration,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let id = registration.id.trim().to_string();
        if id.is_empty() {
            return Err(SchedulerError::InvalidData("node id cannot be empty".to_string()));
        }
        if id == CENTRAL_NODE_ID {
            return Err(SchedulerError::InvalidData(format!(
                "node id {CENTRAL_NODE_ID} is reserved"
            )));
        }
        let location = require_location(registration.location, "node")?;
        let coverage_radius = registration
            .coverage_radius
            .unwrap_or(self.config.default_coverage_radius);
        if !(coverage_radius.is_finite() && coverage_radius >= 0.0) {
            return Err(SchedulerError::InvalidData(
                "coverage radius must be non-negative".to_string(),
            ));
        }
        validate_usage(&registration.metrics)?;
        if self.edges.contains_key(&id) {
            return Err(SchedulerError::DuplicateNode(id));
        }

        info!(node = %id, location = %location, coverage_radius, "edge node registered");
        self.edges.insert(
            id.clone(),
            Node {
                id,
                kind: NodeKind::Edge,
                endpoint: registration.endpoint,
                location,
                coverage_radius,
                last_heartbeat: now,
                registered_at: now,
                metrics: registration.metrics,
                system_info: registration.system_info,
            },
        );
        Ok(())
    }

    /// Applies a metrics report, registering unknown edge nodes.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidData`] for a malformed report.
    pub fn update_node_metrics(&mut self, report: MetricsReport) -> Result<MetricsUpsert> {
        self.update_node_metrics_at(report, Utc::now())
    }

    /// Applies a metrics report received at `now`.
    ///
    /// Container counts and the response time average are maintained by the
    /// fabric itself and survive the report.
    ///
    /// # Errors
    ///
    /// See [`Self::update_node_metrics`].
    pub fn update_node_metrics_at(
        &mut self,
        report: MetricsReport,
        now: DateTime<Utc>,
    ) -> Result<MetricsUpsert> {
        if report.node_id.trim().is_empty() {
            return Err(SchedulerError::InvalidData("node id cannot be empty".to_string()));
        }
        validate_usage(&report.metrics)?;

        if let Some(node) = self.node_mut(&report.node_id) {
            let mut metrics = report.metrics;
            metrics.running_containers = node.metrics.running_containers;
            metrics.warm_containers = node.metrics.warm_containers;
            if metrics.avg_response_time_ms <= 0.0 {
                metrics.avg_response_time_ms = node.metrics.avg_response_time_ms;
            }
            node.metrics = metrics;
            if let Some(info) = report.system_info {
                node.system_info = info;
            }
            if let Some(endpoint) = report.endpoint {
                node.endpoint = endpoint;
            }
            node.last_heartbeat = now;
            debug!(
                node = %report.node_id,
                cpu = node.metrics.cpu_percent,
                memory = node.metrics.memory_percent,
                "node metrics updated"
            );
            return Ok(MetricsUpsert::Updated);
        }

        let registration = EdgeNodeRegistration {
            id: report.node_id.clone(),
            endpoint: report.endpoint.unwrap_or_default(),
            location: Some(report.location.unwrap_or(self.config.default_edge_location)),
            coverage_radius: report.coverage_radius,
            metrics: report.metrics,
            system_info: report.system_info.unwrap_or_default(),
        };
        self.register_edge_node_at(registration, now)?;
        info!(node = %report.node_id, "edge node auto-registered from metrics report");
        Ok(MetricsUpsert::Registered)
    }

    /// Health of one node under the configured thresholds.
    #[must_use]
    pub fn health_of(&self, node: &Node) -> HealthStatus {
        self.config.health.classify(&node.metrics)
    }

    /// Partitions every node, central included, by health.
    #[must_use]
    pub fn classify_nodes(&self) -> NodeHealthReport {
        NodeHealthReport::classify(
            &self.config.health,
            self.all_nodes().map(|n| (n.id.as_str(), &n.metrics)),
        )
    }

    /// Records the fabric's view of a node's containers.
    pub fn sync_container_counts(&mut self, node_id: &str, running: u32, warm: u32) {
        if let Some(node) = self.node_mut(node_id) {
            node.metrics.running_containers = running;
            node.metrics.warm_containers = warm;
        }
    }

    /// Evicts edge nodes whose heartbeat is older than the timeout and
    /// moves their users elsewhere immediately.
    pub fn sweep_dead_nodes_at(&mut self, now: DateTime<Utc>) -> Vec<NodeId> {
        let timeout = self.config.heartbeat_timeout_secs;
        let dead: Vec<NodeId> = self
            .edges
            .values()
            .filter(|n| n.silence_secs(now) > timeout)
            .map(|n| n.id.clone())
            .collect();
        for id in &dead {
            if let Some(node) = self.edges.remove(id) {
                warn!(
                    node = %id,
                    silent_secs = node.silence_secs(now),
                    "edge node evicted after missed heartbeats"
                );
            }
        }
        if !dead.is_empty() {
            self.rehome_users(&dead, now);
        }
        dead
    }

    fn rehome_users(&mut self, evicted: &[NodeId], now: DateTime<Utc>) {
        let stranded: Vec<String> = self
            .users
            .values()
            .filter(|u| evicted.contains(&u.assigned_node_id))
            .map(|u| u.id.clone())
            .collect();
        for user_id in stranded {
            let Some((location, size)) = self.users.get(&user_id).map(|u| (u.location, u.size))
            else {
                continue;
            };
            let (node_id, distance_m) = match self.place_or_central(&location, size) {
                Ok(target) => target,
                Err(e) => {
                    warn!(user = %user_id, error = %e, "rescheduling failed, routing to central");
                    (CENTRAL_NODE_ID.to_string(), self.distance_m(&location, &self.central))
                }
            };
            if let Some(user) = self.users.get_mut(&user_id) {
                let from = std::mem::replace(&mut user.assigned_node_id, node_id.clone());
                user.last_handoff_at = Some(now);
                user.latency.set_distance(distance_m);
                info!(user = %user_id, from = %from, to = %node_id, "user moved off evicted node");
            }
        }
    }

    // ---- placement ----

    fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        std::iter::once(&self.central).chain(self.edges.values())
    }

    fn schedulable(&self, node: &Node) -> bool {
        self.health_of(node).is_schedulable()
    }

    fn distance_m(&self, location: &Location, node: &Node) -> f64 {
        distance_meters(location, &node.location, self.config.meters_per_unit)
    }

    /// Nearest covering node, defaulting to central. Health is not
    /// considered.
    #[must_use]
    pub fn assign_nearest_node(&self, location: &Location) -> (NodeId, f64) {
        let best = lowest_cost(location, Some(&self.central), self.edges.values(), |n| {
            n.location.distance_to(location)
        });
        let node = best.map_or(&self.central, |(n, _)| n);
        (node.id.clone(), self.distance_m(location, node))
    }

    /// Best node for a user at `location` sending `size` bytes, under the
    /// active algorithm. Unhealthy nodes are never candidates.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnsupportedSolver`] when the GAP solver is
    /// configured with an unimplemented solver.
    pub fn schedule_user(&self, location: &Location, size: u64) -> Result<Placement> {
        let central = Some(&self.central).filter(|c| self.schedulable(c));
        let edges = self.edges.values().filter(|n| self.schedulable(n));

        match self.algorithm {
            AssignmentAlgorithm::Greedy => Ok(self.placement(
                location,
                lowest_cost(location, central, edges, |n| n.location.distance_to(location)),
            )),
            AssignmentAlgorithm::Predictive => {
                if self.predictor.is_none() {
                    debug!("no load predictor installed, falling back to greedy");
                }
                Ok(self.placement(
                    location,
                    lowest_cost(location, central, edges, |n| {
                        self.predictive_cost(location, n)
                    }),
                ))
            }
            AssignmentAlgorithm::Gap => self.schedule_gap(location, size, central, edges),
        }
    }

    fn placement(&self, location: &Location, best: Option<(&Node, f64)>) -> Placement {
        match best {
            Some((node, cost)) => Placement::Assigned {
                node_id: node.id.clone(),
                distance_m: self.distance_m(location, node),
                cost,
            },
            None => Placement::NoNodesAvailable,
        }
    }

    fn predictive_cost(&self, location: &Location, node: &Node) -> f64 {
        let prediction = self.predictor.as_ref().and_then(|p| {
            p.predict(&node.id, self.config.prediction_horizon_minutes)
        });
        node.location.distance_to(location) * load_weight(prediction)
    }

    fn gap_node(node: &Node) -> GapNode {
        GapNode {
            id: node.id.clone(),
            node_type: match node.kind {
                NodeKind::Edge => NodeType::Edge,
                NodeKind::Central => NodeType::Central,
            },
            location: node.location,
            warm: node.metrics.warm_containers > 0,
        }
    }

    fn gap_cost(&self, location: &Location, size: u64, node: &Node) -> f64 {
        self.solver
            .latency(location, self.solver.upload_mb(size), &Self::gap_node(node))
    }

    fn schedule_gap<'a>(
        &'a self,
        location: &Location,
        size: u64,
        central: Option<&'a Node>,
        edges: impl Iterator<Item = &'a Node>,
    ) -> Result<Placement> {
        let gap_edges: Vec<GapNode> = edges.map(Self::gap_node).collect();
        let gap_central = central.map(Self::gap_node);
        if gap_edges.is_empty() && gap_central.is_none() {
            return Ok(Placement::NoNodesAvailable);
        }
        let user = GapUser {
            id: String::new(),
            location: *location,
            upload_mb: self.solver.upload_mb(size),
        };
        let assignments = self
            .solver
            .solve(std::slice::from_ref(&user), &gap_edges, gap_central.as_ref())?;
        let Some(assignment) = assignments.into_iter().next() else {
            return Ok(Placement::NoNodesAvailable);
        };
        let target = match assignment.node_type {
            NodeType::Cloud => central,
            NodeType::Edge | NodeType::Central => self.node(&assignment.target_node_id),
        };
        Ok(self.placement(
            location,
            target.map(|n| (n, self.gap_cost(location, size, n))),
        ))
    }

    /// Cost of serving `user` on `node` under the active algorithm.
    ///
    /// Unhealthy nodes cost infinity. So do edge nodes that no longer cover
    /// the user under the distance-based algorithms.
    fn cost_for(&self, user: &UserNode, node: &Node) -> f64 {
        if !self.schedulable(node) {
            return f64::INFINITY;
        }
        match self.algorithm {
            AssignmentAlgorithm::Gap => self.gap_cost(&user.location, user.size, node),
            _ if !node.covers(&user.location) => f64::INFINITY,
            AssignmentAlgorithm::Greedy => node.location.distance_to(&user.location),
            AssignmentAlgorithm::Predictive => self.predictive_cost(&user.location, node),
        }
    }

    fn place_or_central(&self, location: &Location, size: u64) -> Result<(NodeId, f64)> {
        match self.schedule_user(location, size)? {
            Placement::Assigned {
                node_id,
                distance_m,
                ..
            } => Ok((node_id, distance_m)),
            Placement::NoNodesAvailable => {
                warn!(location = %location, "no schedulable node, routing to central");
                Ok((
                    CENTRAL_NODE_ID.to_string(),
                    self.distance_m(location, &self.central),
                ))
            }
        }
    }

    /// Moves a user to a better node if the handoff policy allows it.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotFound`] for an unknown user, or any
    /// scheduling error.
    pub fn maybe_reassign_user_at(
        &mut self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Handoff>> {
        let user = self
            .users
            .get(user_id)
            .ok_or_else(|| SchedulerError::user_not_found(user_id))?;

        let Placement::Assigned {
            node_id,
            distance_m,
            cost,
        } = self.schedule_user(&user.location, user.size)?
        else {
            return Ok(None);
        };
        if node_id == user.assigned_node_id {
            return Ok(None);
        }

        let current_cost = self
            .node(&user.assigned_node_id)
            .map_or(f64::INFINITY, |n| self.cost_for(user, n));
        let decision =
            self.config
                .handoff
                .decide(user.last_handoff_at, now, current_cost, cost);
        let HandoffDecision::Switch(improvement) = decision else {
            debug!(user = %user_id, candidate = %node_id, ?decision, "handoff held");
            return Ok(None);
        };

        let Some(user) = self.users.get_mut(user_id) else {
            return Ok(None);
        };
        let from = std::mem::replace(&mut user.assigned_node_id, node_id.clone());
        user.last_handoff_at = Some(now);
        user.latency.set_distance(distance_m);
        info!(user = %user_id, from = %from, to = %node_id, improvement, "user handed off");
        Ok(Some(Handoff {
            user_id: user_id.to_string(),
            from,
            to: node_id,
            improvement,
        }))
    }

    /// Runs [`Self::maybe_reassign_user_at`] for every user.
    pub fn reassign_all_at(&mut self, now: DateTime<Utc>) -> Vec<Handoff> {
        let ids: Vec<String> = self.users.keys().cloned().collect();
        let mut handoffs = Vec::new();
        for id in ids {
            match self.maybe_reassign_user_at(&id, now) {
                Ok(Some(handoff)) => handoffs.push(handoff),
                Ok(None) => {}
                Err(e @ SchedulerError::UnsupportedSolver(_)) => {
                    warn!(error = %e, "reassignment scan aborted");
                    break;
                }
                Err(e) => warn!(user = %id, error = %e, "reassignment failed"),
            }
        }
        handoffs
    }

    /// Assignment of every user over all schedulable nodes and the cloud.
    ///
    /// Does not change any assignment.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnsupportedSolver`] for an unimplemented
    /// solver.
    pub fn gap_plan(&self) -> Result<Vec<GapAssignment>> {
        let users: Vec<GapUser> = self
            .users
            .values()
            .map(|u| GapUser {
                id: u.id.clone(),
                location: u.location,
                upload_mb: self.solver.upload_mb(u.size),
            })
            .collect();
        let edges: Vec<GapNode> = self
            .edges
            .values()
            .filter(|n| self.schedulable(n))
            .map(Self::gap_node)
            .collect();
        let central = Some(&self.central)
            .filter(|c| self.schedulable(c))
            .map(Self::gap_node);
        self.solver.solve(&users, &edges, central.as_ref())
    }

    // ---- users ----

    /// Creates and places a new user.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidData`] for malformed input or an
    /// existing id.
    pub fn create_user(&mut self, spec: UserSpec) -> Result<UserNode> {
        self.create_user_at(spec, Utc::now())
    }

    /// Creates and places a new user at `now`.
    ///
    /// # Errors
    ///
    /// See [`Self::create_user`].
    pub fn create_user_at(&mut self, spec: UserSpec, now: DateTime<Utc>) -> Result<UserNode> {
        let id = spec.id.trim().to_string();
        if id.is_empty() {
            return Err(SchedulerError::InvalidData("user id cannot be empty".to_string()));
        }
        let location = require_location(spec.location, "user")?;
        if !spec.speed.is_finite() {
            return Err(SchedulerError::InvalidData("speed must be finite".to_string()));
        }
        if self.users.contains_key(&id) {
            return Err(SchedulerError::InvalidData(format!("user already exists: {id}")));
        }

        let (node_id, distance_m) = self.place_or_central(&location, spec.size)?;
        let user = UserNode {
            id: id.clone(),
            location,
            assigned_node_id: node_id,
            size: spec.size,
            speed: spec.speed,
            latency: Latency::new(distance_m, spec.size, self.config.bandwidth_bytes_per_ms),
            created_at: now,
            last_updated: now,
            last_executed: None,
            last_handoff_at: None,
            trace_driven: false,
        };
        info!(
            user = %id,
            location = %location,
            node = %user.assigned_node_id,
            distance_m,
            "user created"
        );
        self.users.insert(id, user.clone());
        Ok(user)
    }

    /// Moves a user and optionally updates its request size and speed.
    ///
    /// The assignment is left to the reassignment scan.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotFound`] for an unknown user and
    /// [`SchedulerError::InvalidData`] for non-finite values.
    pub fn update_user_at(
        &mut self,
        user_id: &str,
        location: Location,
        size: Option<u64>,
        speed: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<UserNode> {
        if !location.is_finite() {
            return Err(SchedulerError::InvalidData(
                "user location must be finite".to_string(),
            ));
        }
        if speed.is_some_and(|s| !s.is_finite()) {
            return Err(SchedulerError::InvalidData("speed must be finite".to_string()));
        }
        let assigned = self
            .users
            .get(user_id)
            .map(|u| u.assigned_node_id.clone())
            .ok_or_else(|| SchedulerError::user_not_found(user_id))?;
        let distance_m = self
            .node(&assigned)
            .map_or_else(|| self.distance_m(&location, &self.central), |n| {
                self.distance_m(&location, n)
            });

        let user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| SchedulerError::user_not_found(user_id))?;
        user.location = location;
        user.latency.set_distance(distance_m);
        if let Some(size) = size {
            user.size = size;
            user.latency.set_data_size(size);
        }
        if let Some(speed) = speed {
            user.speed = speed;
        }
        user.last_updated = now;
        Ok(user.clone())
    }

    /// Applies one trace row, creating the user on first sight.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidData`] for a malformed row.
    pub fn upsert_trace_position_at(
        &mut self,
        step: &TraceStep,
        now: DateTime<Utc>,
    ) -> Result<UserNode> {
        let user_id = step.user_id.trim();
        if user_id.is_empty() {
            return Err(SchedulerError::InvalidData("user id cannot be empty".to_string()));
        }
        if self.users.contains_key(user_id) {
            self.update_user_at(
                user_id,
                step.location(),
                Some(step.size),
                Some(step.speed),
                now,
            )?;
        } else {
            let spec = UserSpec {
                id: user_id.to_string(),
                location: Some(step.location()),
                size: step.size,
                speed: step.speed,
            };
            self.create_user_at(spec, now)?;
        }
        let user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| SchedulerError::user_not_found(user_id))?;
        user.trace_driven = true;
        Ok(user.clone())
    }

    /// Removes a user.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotFound`] for an unknown user.
    pub fn delete_user(&mut self, user_id: &str) -> Result<UserNode> {
        let user = self
            .users
            .remove(user_id)
            .ok_or_else(|| SchedulerError::user_not_found(user_id))?;
        info!(user = %user_id, "user removed");
        Ok(user)
    }

    /// Removes users not updated within the TTL.
    pub fn sweep_inactive_users_at(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let ttl = self.config.user_ttl_secs;
        let stale: Vec<String> = self
            .users
            .values()
            .filter(|u| {
                #[allow(clippy::cast_precision_loss)]
                let idle = (now - u.last_updated).num_milliseconds() as f64 / 1000.0;
                idle > ttl
            })
            .map(|u| u.id.clone())
            .collect();
        for id in &stale {
            self.users.remove(id);
            debug!(user = %id, "inactive user removed");
        }
        if !stale.is_empty() {
            info!(count = stale.len(), "inactive users swept");
        }
        stale
    }

    /// Records a completed execution for `user_id` served by `node_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotFound`] for an unknown user and
    /// [`SchedulerError::InvalidData`] for a non-finite duration.
    pub fn record_execution_at(
        &mut self,
        user_id: &str,
        node_id: &str,
        computation_ms: f64,
        start: ContainerStartKind,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !computation_ms.is_finite() {
            return Err(SchedulerError::InvalidData(
                "computation time must be finite".to_string(),
            ));
        }
        let user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| SchedulerError::user_not_found(user_id))?;
        user.latency.record_execution(computation_ms, start);
        user.last_executed = Some(now);
        let total = user.latency.total_turnaround_ms;

        match self.node_mut(node_id) {
            Some(node) => {
                let avg = &mut node.metrics.avg_response_time_ms;
                *avg = if *avg <= 0.0 {
                    computation_ms
                } else {
                    (1.0 - RESPONSE_TIME_ALPHA) * *avg + RESPONSE_TIME_ALPHA * computation_ms
                };
            }
            None => debug!(node = %node_id, "execution recorded for departed node"),
        }
        debug!(user = %user_id, node = %node_id, computation_ms, total, %start, "execution recorded");
        Ok(())
    }

    // ---- status ----

    fn summary(&self, node: &Node) -> NodeSummary {
        NodeSummary {
            id: node.id.clone(),
            kind: node.kind,
            endpoint: node.endpoint.clone(),
            location: node.location,
            coverage_radius: node.coverage_radius,
            health: self.health_of(node),
            metrics: node.metrics.clone(),
            assigned_users: self.users_on(&node.id),
            last_heartbeat: node.last_heartbeat,
        }
    }

    /// Snapshot of every node and user.
    #[must_use]
    pub fn cluster_status_at(&self, now: DateTime<Utc>) -> ClusterStatus {
        ClusterStatus {
            algorithm: self.algorithm,
            central: self.summary(&self.central),
            edge_nodes: self.edges.values().map(|n| self.summary(n)).collect(),
            users: self
                .users
                .values()
                .map(|u| UserSummary {
                    id: u.id.clone(),
                    location: u.location,
                    assigned_node_id: u.assigned_node_id.clone(),
                    distance_m: u.latency.distance,
                    total_turnaround_ms: u.latency.total_turnaround_ms,
                    container_start: u.latency.container_start,
                    last_updated: u.last_updated,
                })
                .collect(),
            health: self.classify_nodes().counts(),
            generated_at: now,
        }
    }
}

/// Cheapest candidate for `location`. `central` is the default; an edge
/// replaces the current best only if it covers the location and is strictly
/// cheaper, so ties keep the earlier node.
fn lowest_cost<'a>(
    location: &Location,
    central: Option<&'a Node>,
    edges: impl Iterator<Item = &'a Node>,
    cost: impl Fn(&Node) -> f64,
) -> Option<(&'a Node, f64)> {
    let mut best = central.map(|c| (c, cost(c)));
    for node in edges {
        if !node.covers(location) {
            continue;
        }
        let c = cost(node);
        if best.is_none_or(|(_, b)| c < b) {
            best = Some((node, c));
        }
    }
    best
}

fn validate_usage(metrics: &weave_core::NodeMetrics) -> Result<()> {
    let ok = |v: f64| v.is_finite() && v >= 0.0;
    if !ok(metrics.cpu_percent) || !ok(metrics.memory_percent) {
        return Err(SchedulerError::InvalidData(
            "cpu and memory usage must be non-negative numbers".to_string(),
        ));
    }
    Ok(())
}
