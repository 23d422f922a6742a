// Z-score standardization of feature columns.
//
// Means and population standard deviations are fitted once over the rows
// being clustered or trained on and then applied unchanged.

use dugout_core::{AnalysisError, Result};
use serde::Serialize;

/// Below this a column is treated as constant and scales to 0.
const STDEV_EPSILON: f64 = 1e-9;

/// Fitted per-feature mean and standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stdevs: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(AnalysisError::validation("cannot standardize an empty matrix"));
        };
        let dims = first.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != dims) {
            return Err(AnalysisError::validation(format!(
                "dimension mismatch: expected {dims} features, got {}",
                bad.len()
            )));
        }

        let n = rows.len() as f64;
        let mut means = vec![0.0; dims];
        for row in rows {
            for (m, &v) in means.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        let mut stdevs = vec![0.0; dims];
        for row in rows {
            for ((s, &v), &m) in stdevs.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2) / n;
            }
        }
        for s in &mut stdevs {
            *s = s.sqrt();
        }
        Ok(Self { means, stdevs })
    }

    pub fn dims(&self) -> usize {
        self.means.len()
    }

    pub fn mean(&self, feature: usize) -> f64 {
        self.means[feature]
    }

    pub fn stdev(&self, feature: usize) -> f64 {
        self.stdevs[feature]
    }

    /// `(v - mean) / stdev` per feature, or 0 for a constant feature.
    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.dims() {
            return Err(AnalysisError::validation(format!(
                "dimension mismatch: scaler fitted on {} features, got {}",
                self.dims(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.means.iter().zip(&self.stdevs))
            .map(|(&v, (&mean, &stdev))| {
                if stdev < STDEV_EPSILON {
                    0.0
                } else {
                    (v - mean) / stdev
                }
            })
            .collect())
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}
