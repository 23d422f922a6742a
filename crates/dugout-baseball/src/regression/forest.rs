// Bagged regression trees.
//
// Every tree draws its own bootstrap sample from an RNG seeded with
// `seed + tree index`, so a fit is reproducible no matter how rayon
// schedules the trees.

use dugout_core::config::RegressionConfig;
use dugout_core::{AnalysisError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::info;

use crate::regression::tree::{validate_training, RegressionTree, TreeParams};

#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

/// A fitted forest.
#[derive(Debug, Clone)]
pub struct ForestModel {
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForest {
    pub fn from_config(config: &RegressionConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            seed: config.seed,
        }
    }

    pub fn fit(&self, x: &[Vec<f64>], y: &[f64]) -> Result<ForestModel> {
        let n_features = validate_training(x, y)?;
        if self.n_estimators == 0 {
            return Err(AnalysisError::validation("n_estimators must be > 0"));
        }
        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
        };
        let n = x.len();

        let trees: Vec<RegressionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(t as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit_indices(x, y, &sample, params)
            })
            .collect();

        info!(
            "random forest: {} trees on {} rows x {} features",
            trees.len(),
            n,
            n_features
        );
        Ok(ForestModel { trees, n_features })
    }
}

impl ForestModel {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean of the per-tree predictions.
    pub fn predict(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.n_features {
            return Err(AnalysisError::validation(format!(
                "dimension mismatch: forest fitted on {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        let total: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        Ok(total / self.trees.len() as f64)
    }

    pub fn predict_all(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|r| self.predict(r)).collect()
    }

    /// Impurity-based importances: each tree's reductions normalized to
    /// sum to 1, averaged over trees, then renormalized. All zeros when no
    /// tree ever split.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_features];
        for tree in &self.trees {
            let raw = tree.raw_importances();
            let sum: f64 = raw.iter().sum();
            if sum <= 0.0 {
                continue;
            }
            for (t, r) in totals.iter_mut().zip(raw) {
                *t += r / sum;
            }
        }
        let grand: f64 = totals.iter().sum();
        if grand > 0.0 {
            for t in totals.iter_mut() {
                *t /= grand;
            }
        }
        totals
    }
}
