// Principal component analysis for projecting clustered rows onto two axes.
//
// Components are the eigenvectors of the sample covariance matrix, taken
// in descending eigenvalue order from a full symmetric eigendecomposition.

use dugout_core::{AnalysisError, Result};
use nalgebra::DMatrix;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pca {
    mean: Vec<f64>,
    /// Unit-length principal axes, most variance first.
    components: Vec<Vec<f64>>,
    explained_variance: Vec<f64>,
    total_variance: f64,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Flip so the entry with the largest magnitude is positive.
fn fix_sign(v: &mut [f64]) {
    let pivot = v
        .iter()
        .copied()
        .max_by(|a, b| a.abs().total_cmp(&b.abs()))
        .unwrap_or(0.0);
    if pivot < 0.0 {
        for x in v.iter_mut() {
            *x = -*x;
        }
    }
}

impl Pca {
    pub fn fit(data: &[Vec<f64>], n_components: usize) -> Result<Self> {
        let Some(first) = data.first() else {
            return Err(AnalysisError::validation("cannot fit PCA on an empty matrix"));
        };
        let dims = first.len();
        if data.iter().any(|row| row.len() != dims) {
            return Err(AnalysisError::validation("rows have differing feature counts"));
        }
        if n_components == 0 || n_components > dims {
            return Err(AnalysisError::validation(format!(
                "n_components must be between 1 and {dims}, got {n_components}"
            )));
        }

        let n = data.len() as f64;
        let mean: Vec<f64> = (0..dims)
            .map(|d| data.iter().map(|r| r[d]).sum::<f64>() / n)
            .collect();
        let denom = if data.len() > 1 { n - 1.0 } else { 1.0 };

        let centered = DMatrix::from_fn(data.len(), dims, |i, j| data[i][j] - mean[j]);
        let cov = (centered.transpose() * &centered) / denom;
        let total_variance = cov.trace();

        let eigen = cov.symmetric_eigen();
        let mut order: Vec<usize> = (0..dims).collect();
        // Stable, so equal eigenvalues keep the decomposition's order.
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let mut components: Vec<Vec<f64>> = Vec::with_capacity(n_components);
        let mut explained_variance = Vec::with_capacity(n_components);
        for &k in order.iter().take(n_components) {
            let mut vector: Vec<f64> = eigen.eigenvectors.column(k).iter().copied().collect();
            fix_sign(&mut vector);
            components.push(vector);
            // Rounding can leave a zero eigenvalue slightly negative.
            explained_variance.push(eigen.eigenvalues[k].max(0.0));
        }

        Ok(Self {
            mean,
            components,
            explained_variance,
            total_variance,
        })
    }

    pub fn components(&self) -> &[Vec<f64>] {
        &self.components
    }

    pub fn explained_variance(&self) -> &[f64] {
        &self.explained_variance
    }

    /// Share of total variance captured by each component. All zeros when
    /// the data has no variance.
    pub fn explained_variance_ratio(&self) -> Vec<f64> {
        if self.total_variance <= 0.0 {
            return vec![0.0; self.explained_variance.len()];
        }
        self.explained_variance
            .iter()
            .map(|v| v / self.total_variance)
            .collect()
    }

    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.mean.len() {
            return Err(AnalysisError::validation(format!(
                "dimension mismatch: PCA fitted on {} features, got {}",
                self.mean.len(),
                row.len()
            )));
        }
        let centered: Vec<f64> = row.iter().zip(&self.mean).map(|(v, m)| v - m).collect();
        Ok(self.components.iter().map(|c| dot(&centered, c)).collect())
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}
