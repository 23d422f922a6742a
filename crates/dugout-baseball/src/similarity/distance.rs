// Euclidean distances over normalized feature vectors.

use dugout_core::{AnalysisError, Result};
use rayon::prelude::*;

fn l2(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn check_dims(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(AnalysisError::validation(format!(
            "dimension mismatch: expected {expected} features, got {got}"
        )));
    }
    Ok(())
}

/// Euclidean distance between two vectors of equal length.
pub fn euclidean(a: &[f64], b: &[f64]) -> Result<f64> {
    check_dims(a.len(), b.len())?;
    Ok(l2(a, b))
}

/// Distance from one query vector to every candidate, in candidate order.
pub fn distances_from(query: &[f64], candidates: &[Vec<f64>]) -> Result<Vec<f64>> {
    candidates
        .iter()
        .map(|c| euclidean(query, c))
        .collect()
}

/// Dense symmetric N x N distance matrix with a zero diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    size: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    /// Compute all pairwise distances.
    ///
    /// Rows are independent and computed in parallel; the indexed collect
    /// keeps them in input order.
    pub fn compute(vectors: &[Vec<f64>]) -> Result<Self> {
        let size = vectors.len();
        if let Some(first) = vectors.first() {
            for v in vectors {
                check_dims(first.len(), v.len())?;
            }
        }

        let rows: Vec<Vec<f64>> = vectors
            .par_iter()
            .map(|a| vectors.iter().map(|b| l2(a, b)).collect())
            .collect();

        Ok(Self {
            size,
            values: rows.into_iter().flatten().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.size + j]
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.size..(i + 1) * self.size]
    }
}
