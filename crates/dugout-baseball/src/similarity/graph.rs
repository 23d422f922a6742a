// Similarity graph construction.
//
// Entities closer than a distance threshold are joined by an undirected edge
// weighted `1 - distance`. Nodes are either players (all of a name's seasons
// collapsed together) or individual player-seasons.

use std::collections::{BTreeSet, HashMap};

use dugout_core::config::{NetworkConfig, NodeIdentity};
use dugout_core::records::StatRecord;
use dugout_core::{AnalysisError, Result};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use tracing::{debug, info};

use crate::similarity::distance::DistanceMatrix;
use crate::similarity::normalize::NormalizedSet;

pub const DEFAULT_THRESHOLD: f64 = 0.3;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphConfig {
    /// Edge iff distance < threshold. Lower is stricter and gives a sparser graph.
    pub threshold: f64,
    pub identity: NodeIdentity,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            identity: NodeIdentity::Player,
        }
    }
}

impl From<&NetworkConfig> for GraphConfig {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            threshold: config.threshold,
            identity: config.node_identity,
        }
    }
}

/// Node label for a record under the given identity.
pub fn node_label(record: &StatRecord, identity: NodeIdentity) -> String {
    match identity {
        NodeIdentity::Player => record.name.clone(),
        NodeIdentity::PlayerSeason => record.key().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerNode {
    pub label: String,
    pub name: String,
    /// Distinct seasons of the entities folded into this node.
    pub seasons: BTreeSet<i32>,
}

/// Undirected similarity graph with label lookup. Node indices follow
/// insertion order.
#[derive(Debug, Clone)]
pub struct SimilarityGraph {
    graph: UnGraph<PlayerNode, f64>,
    index: HashMap<String, NodeIndex>,
    identity: NodeIdentity,
}

impl SimilarityGraph {
    /// Build the graph over every entity of `set`.
    ///
    /// With player identity, two similar seasons of the same player would
    /// form a self-loop; those are skipped. A node pair reached through
    /// several season pairs keeps the weight of the last one seen.
    pub fn build(
        set: &NormalizedSet<'_>,
        distances: &DistanceMatrix,
        config: &GraphConfig,
    ) -> Result<Self> {
        if distances.len() != set.len() {
            return Err(AnalysisError::validation(format!(
                "distance matrix covers {} entities but the set has {}",
                distances.len(),
                set.len()
            )));
        }

        let mut graph = Self {
            graph: UnGraph::default(),
            index: HashMap::new(),
            identity: config.identity,
        };

        let entity_nodes: Vec<NodeIndex> = (0..set.len())
            .map(|i| graph.add_entity(set.record(i), config.identity))
            .collect();

        let mut self_loops = 0usize;
        for i in 0..set.len() {
            for j in (i + 1)..set.len() {
                let d = distances.get(i, j);
                if d >= config.threshold {
                    continue;
                }
                let (a, b) = (entity_nodes[i], entity_nodes[j]);
                if a == b {
                    self_loops += 1;
                    continue;
                }
                graph.graph.update_edge(a, b, 1.0 - d);
            }
        }
        if self_loops > 0 {
            debug!("skipped {} same-node pairs", self_loops);
        }

        info!(
            "similarity graph: {} nodes, {} edges (threshold {})",
            graph.node_count(),
            graph.edge_count(),
            config.threshold
        );
        Ok(graph)
    }

    fn add_entity(&mut self, record: &StatRecord, identity: NodeIdentity) -> NodeIndex {
        let label = node_label(record, identity);
        let idx = match self.index.get(&label) {
            Some(&idx) => idx,
            None => {
                let idx = self.graph.add_node(PlayerNode {
                    label: label.clone(),
                    name: record.name.clone(),
                    seasons: BTreeSet::new(),
                });
                self.index.insert(label, idx);
                idx
            }
        };
        self.graph[idx].seasons.insert(record.season);
        idx
    }

    /// Keep the nodes accepted by `keep` and every edge between them.
    pub(crate) fn induced<F>(&self, keep: F) -> Self
    where
        F: Fn(NodeIndex, &PlayerNode) -> bool,
    {
        let graph = self.graph.filter_map(
            |idx, node| keep(idx, node).then(|| node.clone()),
            |_, &weight| Some(weight),
        );
        let index = graph
            .node_indices()
            .map(|idx| (graph[idx].label.clone(), idx))
            .collect();
        Self {
            graph,
            index,
            identity: self.identity,
        }
    }

    pub fn graph(&self) -> &UnGraph<PlayerNode, f64> {
        &self.graph
    }

    /// How records map onto this graph's nodes.
    pub fn identity(&self) -> NodeIdentity {
        self.identity
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub(crate) fn index_of(&self, label: &str) -> Result<NodeIndex> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| AnalysisError::UnknownNode(label.to_string()))
    }

    pub fn node(&self, label: &str) -> Option<&PlayerNode> {
        self.index.get(label).map(|&idx| &self.graph[idx])
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &PlayerNode> + '_ {
        self.graph.node_indices().map(move |idx| &self.graph[idx])
    }

    pub fn degree(&self, label: &str) -> Result<usize> {
        let idx = self.index_of(label)?;
        Ok(self.graph.edges(idx).count())
    }

    /// Neighbor labels in node insertion order.
    pub fn neighbors(&self, label: &str) -> Result<Vec<&str>> {
        let idx = self.index_of(label)?;
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors(idx).collect();
        neighbors.sort();
        neighbors.dedup();
        Ok(neighbors
            .into_iter()
            .map(|n| self.graph[n].label.as_str())
            .collect())
    }

    /// Edge weight between two labelled nodes, if connected.
    pub fn weight(&self, a: &str, b: &str) -> Option<f64> {
        let (a, b) = (self.index.get(a)?, self.index.get(b)?);
        self.graph
            .find_edge(*a, *b)
            .map(|e| self.graph[e])
    }

    /// All edges as (label, label, weight) with the lower node index first.
    pub fn edges(&self) -> Vec<(&str, &str, f64)> {
        self.graph
            .edge_references()
            .map(|e| {
                let (a, b) = if e.source() <= e.target() {
                    (e.source(), e.target())
                } else {
                    (e.target(), e.source())
                };
                (
                    self.graph[a].label.as_str(),
                    self.graph[b].label.as_str(),
                    *e.weight(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dugout_core::config::MissingPolicy;
    use std::collections::{BTreeMap, HashSet};

    fn record(name: &str, season: i32, x: f64, y: f64) -> StatRecord {
        let mut stats = BTreeMap::new();
        stats.insert("X".to_string(), Some(x));
        stats.insert("Y".to_string(), Some(y));
        StatRecord {
            name: name.into(),
            season,
            team: "OAK".into(),
            stats,
        }
    }

    fn features() -> Vec<String> {
        vec!["X".into(), "Y".into()]
    }

    fn build(records: &[StatRecord], config: GraphConfig) -> SimilarityGraph {
        let set = NormalizedSet::fit(records, &features(), MissingPolicy::Drop).unwrap();
        let distances = DistanceMatrix::compute(set.vectors()).unwrap();
        SimilarityGraph::build(&set, &distances, &config).unwrap()
    }

    fn spread() -> Vec<StatRecord> {
        vec![
            record("A", 2020, 0.0, 0.0),
            record("B", 2020, 0.1, 0.0),
            record("C", 2020, 0.3, 0.1),
            record("D", 2020, 0.6, 0.5),
            record("E", 2020, 0.7, 0.9),
            record("F", 2020, 1.0, 1.0),
        ]
    }

    fn edge_set(graph: &SimilarityGraph) -> HashSet<(String, String)> {
        graph
            .edges()
            .into_iter()
            .map(|(a, b, _)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn edges_only_below_threshold_with_weight() {
        let records = vec![
            record("A", 2020, 0.0, 0.0),
            record("B", 2020, 0.2, 0.0),
            record("C", 2020, 1.0, 1.0),
        ];
        let graph = build(&records, GraphConfig::default());
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 1);
        let w = graph.weight("A", "B").unwrap();
        assert!((w - 0.8).abs() < 1e-12);
        assert!(graph.weight("A", "C").is_none());
    }

    #[test]
    fn threshold_monotonic_edge_sets() {
        let records = spread();
        let thresholds = [0.05, 0.15, 0.3, 0.5, 0.8, 1.5];
        let sets: Vec<_> = thresholds
            .iter()
            .map(|&t| {
                edge_set(&build(
                    &records,
                    GraphConfig {
                        threshold: t,
                        identity: NodeIdentity::Player,
                    },
                ))
            })
            .collect();
        for pair in sets.windows(2) {
            assert!(pair[0].is_subset(&pair[1]));
        }
        // The loosest threshold connects everything.
        assert_eq!(sets.last().unwrap().len(), 15);
    }

    #[test]
    fn player_identity_collapses_seasons() {
        let records = vec![
            record("A", 2019, 0.0, 0.0),
            record("A", 2020, 0.05, 0.0),
            record("B", 2020, 0.1, 0.0),
            record("C", 2020, 1.0, 1.0),
        ];
        let graph = build(&records, GraphConfig::default());
        assert_eq!(graph.node_count(), 3);
        let a = graph.node("A").unwrap();
        assert_eq!(a.seasons.iter().copied().collect::<Vec<_>>(), vec![2019, 2020]);
        // A(2019)-A(2020) would be a self-loop and is skipped.
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.neighbors("A").unwrap(), vec!["B"]);
    }

    #[test]
    fn player_season_identity_keeps_seasons_apart() {
        let records = vec![
            record("A", 2019, 0.0, 0.0),
            record("A", 2020, 0.05, 0.0),
            record("B", 2020, 0.1, 0.0),
            record("C", 2020, 1.0, 1.0),
        ];
        let graph = build(
            &records,
            GraphConfig {
                threshold: DEFAULT_THRESHOLD,
                identity: NodeIdentity::PlayerSeason,
            },
        );
        assert_eq!(graph.node_count(), 4);
        assert!(graph.contains("A (2019)"));
        assert!(graph.contains("A (2020)"));
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.degree("A (2019)").unwrap(), 2);
        assert_eq!(graph.identity(), NodeIdentity::PlayerSeason);
    }

    #[test]
    fn degenerate_inputs_give_no_edges() {
        let graph = build(&[record("Solo", 2020, 1.0, 1.0)], GraphConfig::default());
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.degree("Solo").unwrap(), 0);
    }

    #[test]
    fn mismatched_distance_matrix_rejected() {
        let records = spread();
        let set = NormalizedSet::fit(&records, &features(), MissingPolicy::Drop).unwrap();
        let distances = DistanceMatrix::compute(&set.vectors()[..2]).unwrap();
        let err = SimilarityGraph::build(&set, &distances, &GraphConfig::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
    }

    #[test]
    fn unknown_label_is_error() {
        let graph = build(&spread(), GraphConfig::default());
        assert!(matches!(graph.degree("Z"), Err(AnalysisError::UnknownNode(_))));
        assert!(graph.neighbors("Z").is_err());
    }

    #[test]
    fn nodes_keep_insertion_order() {
        let graph = build(&spread(), GraphConfig::default());
        let labels: Vec<&str> = graph.nodes().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B", "C", "D", "E", "F"]);
    }
}
