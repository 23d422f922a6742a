// Similarity pipeline: min-max normalization, pairwise distances, neighbor
// ranking, and the similarity graph with its centrality measures.

pub mod centrality;
pub mod distance;
pub mod graph;
pub mod normalize;
pub mod ranking;
