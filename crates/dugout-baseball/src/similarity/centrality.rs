// Degree centrality and focal-node subgraphs.

use std::collections::{BTreeSet, HashMap, HashSet};

use dugout_core::records::StatRecord;
use dugout_core::Result;
use petgraph::graph::NodeIndex;
use serde::Serialize;

use crate::similarity::graph::{node_label, SimilarityGraph};

/// Centrality of one node. `centrality` is `degree / (N - 1)`, and 0 for a
/// graph with fewer than two nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CentralityScore {
    pub label: String,
    pub name: String,
    pub degree: usize,
    pub centrality: f64,
}

/// Degree centrality for every node, most central first. Ties keep node
/// insertion order.
pub fn degree_centrality(graph: &SimilarityGraph) -> Vec<CentralityScore> {
    let n = graph.node_count();
    let inner = graph.graph();
    let mut scores: Vec<CentralityScore> = inner
        .node_indices()
        .map(|idx| {
            let degree = inner.edges(idx).count();
            let centrality = if n > 1 {
                degree as f64 / (n - 1) as f64
            } else {
                0.0
            };
            CentralityScore {
                label: inner[idx].label.clone(),
                name: inner[idx].name.clone(),
                degree,
                centrality,
            }
        })
        .collect();
    // Raw degree orders exactly like the normalized score.
    scores.sort_by(|a, b| b.degree.cmp(&a.degree));
    scores
}

/// Induced subgraph of a node and its direct neighbors.
pub fn ego_network(graph: &SimilarityGraph, label: &str) -> Result<SimilarityGraph> {
    let center = graph.index_of(label)?;
    let mut keep: HashSet<NodeIndex> = graph.graph().neighbors(center).collect();
    keep.insert(center);
    Ok(graph.induced(|idx, _| keep.contains(&idx)))
}

/// Induced subgraph of every node that shares at least one season with the
/// focal node (the focal node included).
///
/// A node's seasons are those folded into it plus the seasons of every
/// matching row in `records`, so rows dropped from the graph for missing
/// features still place a player in a season.
pub fn season_cohort(
    graph: &SimilarityGraph,
    label: &str,
    records: &[StatRecord],
) -> Result<SimilarityGraph> {
    let center = graph.index_of(label)?;
    let mut seasons: HashMap<&str, BTreeSet<i32>> = graph
        .nodes()
        .map(|node| (node.label.as_str(), node.seasons.clone()))
        .collect();
    for record in records {
        if let Some(set) = seasons.get_mut(node_label(record, graph.identity()).as_str()) {
            set.insert(record.season);
        }
    }
    let focal = seasons.get(label).cloned().unwrap_or_default();
    Ok(graph.induced(|idx, node| {
        idx == center
            || seasons
                .get(node.label.as_str())
                .is_some_and(|s| !s.is_disjoint(&focal))
    }))
}
