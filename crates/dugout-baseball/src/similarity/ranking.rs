// Nearest-neighbor ranking of entities by normalized-feature distance.

use dugout_core::records::{EntityKey, StatRecord};
use dugout_core::{AnalysisError, Result};
use serde::Serialize;
use tracing::{debug, warn};

use crate::similarity::distance::distances_from;
use crate::similarity::normalize::NormalizedSet;

pub const DEFAULT_TOP_K: usize = 10;

/// One ranked result, pointing back at the unnormalized source row.
#[derive(Debug, Clone, Serialize)]
pub struct Neighbor<'a> {
    pub rank: usize,
    pub record: &'a StatRecord,
    pub distance: f64,
}

/// Ranked neighbors of one query entity.
#[derive(Debug, Clone, Serialize)]
pub struct Ranking<'a> {
    pub query: &'a StatRecord,
    pub neighbors: Vec<Neighbor<'a>>,
}

/// Result of one query in a batch: either a ranking or the reason it failed.
#[derive(Debug)]
pub struct QueryOutcome<'a> {
    pub key: EntityKey,
    pub result: Result<Ranking<'a>>,
}

impl<'a> QueryOutcome<'a> {
    /// Ranked neighbors, empty when the query failed.
    pub fn neighbors(&self) -> &[Neighbor<'a>] {
        match &self.result {
            Ok(ranking) => &ranking.neighbors,
            Err(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&AnalysisError> {
        self.result.as_ref().err()
    }
}

/// Ranks every other entity by ascending distance to a query entity.
#[derive(Debug, Clone)]
pub struct SimilarityRanker<'s, 'a> {
    set: &'s NormalizedSet<'a>,
    top_k: usize,
    exclude_same_player: bool,
}

impl<'s, 'a> SimilarityRanker<'s, 'a> {
    pub fn new(set: &'s NormalizedSet<'a>) -> Self {
        Self {
            set,
            top_k: DEFAULT_TOP_K,
            exclude_same_player: false,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Also drop the query player's other seasons from the results.
    pub fn excluding_same_player(mut self, exclude: bool) -> Self {
        self.exclude_same_player = exclude;
        self
    }

    fn is_excluded(&self, record: &StatRecord, key: &EntityKey) -> bool {
        if self.exclude_same_player {
            record.name == key.name
        } else {
            record.matches(key)
        }
    }

    /// Rank all other entities against `key`.
    ///
    /// Every row with the query's (Name, Season) is excluded. Ties keep input
    /// order since the sort is stable.
    pub fn rank(&self, key: &EntityKey) -> Result<Ranking<'a>> {
        let position = self.set.position(key).ok_or_else(|| AnalysisError::NotFound {
            name: key.name.clone(),
            season: key.season,
        })?;

        let distances = distances_from(self.set.vector(position), self.set.vectors())?;
        let mut candidates: Vec<(usize, f64)> = distances
            .into_iter()
            .enumerate()
            .filter(|&(i, _)| !self.is_excluded(self.set.record(i), key))
            .collect();
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
        candidates.truncate(self.top_k);

        let neighbors: Vec<Neighbor<'a>> = candidates
            .into_iter()
            .enumerate()
            .map(|(rank, (i, distance))| Neighbor {
                rank: rank + 1,
                record: self.set.record(i),
                distance,
            })
            .collect();
        debug!("{}: {} neighbors ranked", key, neighbors.len());

        Ok(Ranking {
            query: self.set.record(position),
            neighbors,
        })
    }

    /// Run a batch of queries. A missing entity is recorded on its outcome
    /// and the batch carries on.
    pub fn rank_all(&self, keys: &[EntityKey]) -> Vec<QueryOutcome<'a>> {
        keys.iter()
            .map(|key| {
                let result = self.rank(key);
                if let Err(e) = &result {
                    warn!("similarity query skipped: {}", e);
                }
                QueryOutcome {
                    key: key.clone(),
                    result,
                }
            })
            .collect()
    }
}
