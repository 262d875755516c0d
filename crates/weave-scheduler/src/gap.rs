//! Generalized-assignment placement of users onto edge, central or cloud.
//!
//! Every user can be served by any edge node, the central node, or the
//! remote cloud. The profit of serving user `u` on node `v` is the latency
//! saved against the cloud baseline, floored at zero. The greedy solver
//! picks the most profitable column per user.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use weave_core::{Location, NodeId};

use crate::error::{Result, SchedulerError};

/// Column id used for the remote cloud.
pub const CLOUD_NODE_ID: &str = "cloud";

/// Tier a GAP column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// An edge node.
    Edge,
    /// The central node.
    Central,
    /// The remote cloud.
    Cloud,
}

/// Assignment solver implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// Per-user best column.
    #[default]
    Greedy,
    /// Integer linear program. Not implemented.
    Ilp,
}

impl std::fmt::Display for SolverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Greedy => f.write_str("greedy"),
            Self::Ilp => f.write_str("ilp"),
        }
    }
}

/// Latency model constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapConfig {
    /// Solver to use.
    pub solver: SolverKind,
    /// Upload size assumed for users that report no data size.
    pub default_upload_mb: f64,
    /// Per-MB transfer delay to the cloud, independent of distance.
    pub cloud_delay_per_mb_ms: f64,
    /// Per-MB transfer delay to an edge node at distance zero.
    pub edge_delay_per_mb_ms: f64,
    /// Per-MB transfer delay to the central node at distance zero.
    pub central_delay_per_mb_ms: f64,
    /// Extra delay when no warm container is available.
    pub cold_start_penalty_ms: f64,
    /// Per-MB processing time on an edge node.
    pub edge_processing_ms_per_mb: f64,
    /// Per-MB processing time on the central node.
    pub central_processing_ms_per_mb: f64,
    /// Per-MB processing time in the cloud.
    pub cloud_processing_ms_per_mb: f64,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            solver: SolverKind::Greedy,
            default_upload_mb: 1.0,
            cloud_delay_per_mb_ms: 500.0,
            edge_delay_per_mb_ms: 5.0,
            central_delay_per_mb_ms: 20.0,
            cold_start_penalty_ms: 300.0,
            edge_processing_ms_per_mb: 50.0,
            central_processing_ms_per_mb: 25.0,
            cloud_processing_ms_per_mb: 10.0,
        }
    }
}

impl GapConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        let values = [
            self.default_upload_mb,
            self.cloud_delay_per_mb_ms,
            self.edge_delay_per_mb_ms,
            self.central_delay_per_mb_ms,
            self.cold_start_penalty_ms,
            self.edge_processing_ms_per_mb,
            self.central_processing_ms_per_mb,
            self.cloud_processing_ms_per_mb,
        ];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(SchedulerError::InvalidData(
                "gap latency constants must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// A user row of the profit matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct GapUser {
    /// User id.
    pub id: String,
    /// User location.
    pub location: Location,
    /// Request payload in megabytes.
    pub upload_mb: f64,
}

/// A node column of the profit matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct GapNode {
    /// Node id.
    pub id: NodeId,
    /// Tier.
    pub node_type: NodeType,
    /// Node location. Ignored for the cloud.
    pub location: Location,
    /// Whether the node holds at least one warm container.
    pub warm: bool,
}

impl GapNode {
    /// The cloud column.
    #[must_use]
    pub fn cloud() -> Self {
        Self {
            id: CLOUD_NODE_ID.to_string(),
            node_type: NodeType::Cloud,
            location: Location::default(),
            warm: true,
        }
    }
}

/// One user's placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapAssignment {
    /// User id.
    pub user_id: String,
    /// Chosen node id, [`CLOUD_NODE_ID`] for the cloud.
    pub target_node_id: NodeId,
    /// Tier of the chosen node.
    pub node_type: NodeType,
    /// Latency saved against the cloud baseline.
    pub utility_gain: f64,
    /// Estimated latency on the chosen node.
    pub estimated_latency: f64,
}

/// Aggregate view over a set of assignments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentStats {
    /// Number of assignments.
    pub users: usize,
    /// Sum of utility gains.
    pub total_utility: f64,
    /// Mean estimated latency.
    pub mean_latency_ms: f64,
    /// Users placed on edge nodes.
    pub edge_count: usize,
    /// Users placed on the central node.
    pub central_count: usize,
    /// Users left in the cloud.
    pub cloud_count: usize,
}

/// Profit matrix with the latency estimates it was built from.
///
/// Columns are the edge nodes in the order given, then the central node if
/// present, then the cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfitMatrix {
    users: Vec<String>,
    columns: Vec<(NodeId, NodeType)>,
    profit: Vec<Vec<f64>>,
    latency: Vec<Vec<f64>>,
}

impl ProfitMatrix {
    /// Row count.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Column count, cloud included.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column ids and tiers in order.
    #[must_use]
    pub fn columns(&self) -> &[(NodeId, NodeType)] {
        &self.columns
    }

    /// Profit of placing user row `u` on column `v`.
    #[must_use]
    pub fn profit(&self, u: usize, v: usize) -> Option<f64> {
        self.profit.get(u).and_then(|row| row.get(v)).copied()
    }

    /// Profit row of user `u`.
    #[must_use]
    pub fn row(&self, u: usize) -> Option<&[f64]> {
        self.profit.get(u).map(Vec::as_slice)
    }
}

/// GAP solver over a fixed latency model.
#[derive(Debug, Clone, Default)]
pub struct GapSolver {
    config: GapConfig,
}

impl GapSolver {
    /// Creates a solver.
    #[must_use]
    pub const fn new(config: GapConfig) -> Self {
        Self { config }
    }

    /// Latency model in use.
    #[must_use]
    pub const fn config(&self) -> &GapConfig {
        &self.config
    }

    /// Upload size for a request of `size_bytes`, falling back to the
    /// configured default for empty requests.
    #[must_use]
    pub fn upload_mb(&self, size_bytes: u64) -> f64 {
        if size_bytes == 0 {
            self.config.default_upload_mb
        } else {
            #[allow(clippy::cast_precision_loss)]
            let mb = size_bytes as f64 / 1_000_000.0;
            mb
        }
    }

    /// Estimated turnaround for serving a user at `user` on `node`.
    #[must_use]
    pub fn latency(&self, user: &Location, upload_mb: f64, node: &GapNode) -> f64 {
        let c = &self.config;
        let total = match node.node_type {
            NodeType::Cloud => {
                upload_mb * c.cloud_delay_per_mb_ms + upload_mb * c.cloud_processing_ms_per_mb
            }
            NodeType::Edge | NodeType::Central => {
                let (per_mb, rate) = if node.node_type == NodeType::Edge {
                    (c.edge_delay_per_mb_ms, c.edge_processing_ms_per_mb)
                } else {
                    (c.central_delay_per_mb_ms, c.central_processing_ms_per_mb)
                };
                let scale = user.distance_to(&node.location) / 100.0 + 1.0;
                let cold = if node.warm { 0.0 } else { c.cold_start_penalty_ms };
                upload_mb * per_mb * scale + cold + upload_mb * rate
            }
        };
        total.max(0.0)
    }

    /// Builds the profit matrix for `users` over `edges`, `central` and the
    /// cloud.
    #[must_use]
    pub fn build_profit_matrix(
        &self,
        users: &[GapUser],
        edges: &[GapNode],
        central: Option<&GapNode>,
    ) -> ProfitMatrix {
        let cloud = GapNode::cloud();
        let nodes: Vec<&GapNode> = edges.iter().chain(central).chain([&cloud]).collect();

        let mut profit = Vec::with_capacity(users.len());
        let mut latency = Vec::with_capacity(users.len());
        for user in users {
            let baseline = self.latency(&user.location, user.upload_mb, &cloud);
            let lat_row: Vec<f64> = nodes
                .iter()
                .map(|node| self.latency(&user.location, user.upload_mb, node))
                .collect();
            let profit_row = nodes
                .iter()
                .zip(&lat_row)
                .map(|(node, lat)| {
                    if node.node_type == NodeType::Cloud {
                        0.0
                    } else {
                        (baseline - lat).max(0.0)
                    }
                })
                .collect();
            profit.push(profit_row);
            latency.push(lat_row);
        }

        ProfitMatrix {
            users: users.iter().map(|u| u.id.clone()).collect(),
            columns: nodes.iter().map(|n| (n.id.clone(), n.node_type)).collect(),
            profit,
            latency,
        }
    }

    /// Picks the most profitable column for every user. Ties go to the
    /// earliest column.
    #[must_use]
    pub fn solve_greedy(&self, matrix: &ProfitMatrix) -> Vec<GapAssignment> {
        let mut assignments = Vec::with_capacity(matrix.users.len());
        for (u, user_id) in matrix.users.iter().enumerate() {
            let row = &matrix.profit[u];
            let mut best = 0;
            for (v, gain) in row.iter().enumerate() {
                if *gain > row[best] {
                    best = v;
                }
            }
            let Some((node_id, node_type)) = matrix.columns.get(best) else {
                continue;
            };
            assignments.push(GapAssignment {
                user_id: user_id.clone(),
                target_node_id: node_id.clone(),
                node_type: *node_type,
                utility_gain: row[best],
                estimated_latency: matrix.latency[u][best],
            });
        }
        debug!(users = assignments.len(), "greedy GAP solved");
        assignments
    }

    /// Builds the matrix and runs the configured solver.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnsupportedSolver`] if the configured solver
    /// has no implementation.
    pub fn solve(
        &self,
        users: &[GapUser],
        edges: &[GapNode],
        central: Option<&GapNode>,
    ) -> Result<Vec<GapAssignment>> {
        match self.config.solver {
            SolverKind::Greedy => {
                let matrix = self.build_profit_matrix(users, edges, central);
                Ok(self.solve_greedy(&matrix))
            }
            SolverKind::Ilp => {
                error!(solver = %SolverKind::Ilp, "configured GAP solver is not available");
                Err(SchedulerError::UnsupportedSolver(SolverKind::Ilp.to_string()))
            }
        }
    }
}

/// Summarizes `assignments`. All zeros for an empty slice.
#[must_use]
pub fn assignment_stats(assignments: &[GapAssignment]) -> AssignmentStats {
    if assignments.is_empty() {
        return AssignmentStats::default();
    }
    let mut stats = AssignmentStats {
        users: assignments.len(),
        ..AssignmentStats::default()
    };
    let mut latency_sum = 0.0;
    for a in assignments {
        stats.total_utility += a.utility_gain;
        latency_sum += a.estimated_latency;
        match a.node_type {
            NodeType::Edge => stats.edge_count += 1,
            NodeType::Central => stats.central_count += 1,
            NodeType::Cloud => stats.cloud_count += 1,
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let n = assignments.len() as f64;
    stats.mean_latency_ms = latency_sum / n;
    stats
}
