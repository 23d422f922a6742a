// Min-max feature normalization.
//
// Parameters are fitted once over the full candidate set and then applied
// unchanged to every vector, query vectors included.

use dugout_core::config::MissingPolicy;
use dugout_core::records::{EntityKey, StatRecord};
use dugout_core::{AnalysisError, Result};
use serde::Serialize;

use crate::features::FeatureMatrix;

/// Fitted per-feature minimum and maximum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinMaxScaler {
    mins: Vec<f64>,
    maxs: Vec<f64>,
}

impl MinMaxScaler {
    /// Fit on every row of a feature matrix. An empty matrix cannot be fitted.
    pub fn fit(matrix: &FeatureMatrix<'_>) -> Result<Self> {
        if matrix.is_empty() {
            return Err(AnalysisError::validation(
                "cannot fit normalization: no record has every feature",
            ));
        }
        let dims = matrix.dims();
        let mut mins = vec![f64::INFINITY; dims];
        let mut maxs = vec![f64::NEG_INFINITY; dims];
        for row in matrix.rows() {
            for (d, &v) in row.values.iter().enumerate() {
                mins[d] = mins[d].min(v);
                maxs[d] = maxs[d].max(v);
            }
        }
        Ok(Self { mins, maxs })
    }

    pub fn dims(&self) -> usize {
        self.mins.len()
    }

    pub fn min(&self, feature: usize) -> f64 {
        self.mins[feature]
    }

    pub fn max(&self, feature: usize) -> f64 {
        self.maxs[feature]
    }

    /// Scale one raw vector: `(v - min) / (max - min)`, or 0 for a constant
    /// feature. Values outside the fitted range are not clamped.
    pub fn transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        if values.len() != self.dims() {
            return Err(AnalysisError::validation(format!(
                "dimension mismatch: scaler fitted on {} features, got {}",
                self.dims(),
                values.len()
            )));
        }
        Ok(values
            .iter()
            .zip(self.mins.iter().zip(&self.maxs))
            .map(|(&v, (&min, &max))| {
                let range = max - min;
                if range == 0.0 {
                    0.0
                } else {
                    (v - min) / range
                }
            })
            .collect())
    }
}

/// A feature matrix together with its fitted scaler and normalized vectors.
#[derive(Debug, Clone)]
pub struct NormalizedSet<'a> {
    matrix: FeatureMatrix<'a>,
    scaler: MinMaxScaler,
    vectors: Vec<Vec<f64>>,
}

impl<'a> NormalizedSet<'a> {
    /// Build the feature matrix, fit the scaler over all of it, and normalize
    /// every row.
    pub fn fit(
        records: &'a [StatRecord],
        features: &[String],
        policy: MissingPolicy,
    ) -> Result<Self> {
        let matrix = FeatureMatrix::build(records, features, policy)?;
        Self::from_matrix(matrix)
    }

    pub fn from_matrix(matrix: FeatureMatrix<'a>) -> Result<Self> {
        let scaler = MinMaxScaler::fit(&matrix)?;
        let vectors = matrix
            .rows()
            .iter()
            .map(|row| scaler.transform(&row.values))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            matrix,
            scaler,
            vectors,
        })
    }

    pub fn matrix(&self) -> &FeatureMatrix<'a> {
        &self.matrix
    }

    pub fn scaler(&self) -> &MinMaxScaler {
        &self.scaler
    }

    pub fn features(&self) -> &[String] {
        self.matrix.features()
    }

    pub fn vectors(&self) -> &[Vec<f64>] {
        &self.vectors
    }

    pub fn vector(&self, i: usize) -> &[f64] {
        &self.vectors[i]
    }

    pub fn record(&self, i: usize) -> &'a StatRecord {
        self.matrix.record(i)
    }

    pub fn position(&self, key: &EntityKey) -> Option<usize> {
        self.matrix.position(key)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Normalize an outside vector with the already-fitted parameters.
    pub fn normalize_query(&self, raw: &[f64]) -> Result<Vec<f64>> {
        self.scaler.transform(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(name: &str, season: i32, pa: f64, war: f64) -> StatRecord {
        let mut stats = BTreeMap::new();
        stats.insert("PA".to_string(), Some(pa));
        stats.insert("WAR".to_string(), Some(war));
        StatRecord {
            name: name.into(),
            season,
            team: "OAK".into(),
            stats,
        }
    }

    fn features() -> Vec<String> {
        vec!["PA".into(), "WAR".into()]
    }

    fn sample() -> Vec<StatRecord> {
        vec![
            record("Matt Olson", 2021, 673.0, 5.1),
            record("Mark Canha", 2021, 625.0, 2.7),
            record("Sean Murphy", 2021, 448.0, 2.6),
            record("Elvis Andrus", 2021, 541.0, -0.4),
        ]
    }

    #[test]
    fn every_component_in_unit_interval() {
        let records = sample();
        let set = NormalizedSet::fit(&records, &features(), MissingPolicy::Drop).unwrap();
        for v in set.vectors() {
            for &c in v {
                assert!((0.0..=1.0).contains(&c), "component {c} out of range");
            }
        }
    }

    #[test]
    fn min_maps_to_zero_and_max_to_one() {
        let records = sample();
        let set = NormalizedSet::fit(&records, &features(), MissingPolicy::Drop).unwrap();
        // PA: min 448 (Murphy), max 673 (Olson)
        assert_eq!(set.vector(2)[0], 0.0);
        assert_eq!(set.vector(0)[0], 1.0);
        // WAR: min -0.4 (Andrus), max 5.1 (Olson)
        assert_eq!(set.vector(3)[1], 0.0);
        assert_eq!(set.vector(0)[1], 1.0);
    }

    #[test]
    fn fitted_extremes_round_trip_exactly() {
        let records = sample();
        let set = NormalizedSet::fit(&records, &features(), MissingPolicy::Drop).unwrap();
        let scaler = set.scaler();
        let mins: Vec<f64> = (0..scaler.dims()).map(|d| scaler.min(d)).collect();
        let maxs: Vec<f64> = (0..scaler.dims()).map(|d| scaler.max(d)).collect();
        assert_eq!(set.normalize_query(&mins).unwrap(), vec![0.0, 0.0]);
        assert_eq!(set.normalize_query(&maxs).unwrap(), vec![1.0, 1.0]);
    }

    #[test]
    fn constant_feature_maps_to_zero() {
        let records = vec![
            record("A", 2020, 500.0, 1.0),
            record("B", 2020, 500.0, 3.0),
        ];
        let set = NormalizedSet::fit(&records, &features(), MissingPolicy::Drop).unwrap();
        assert_eq!(set.vector(0)[0], 0.0);
        assert_eq!(set.vector(1)[0], 0.0);
    }

    #[test]
    fn query_uses_fitted_parameters_without_clamping() {
        let records = vec![record("A", 2020, 100.0, 0.0), record("B", 2020, 200.0, 10.0)];
        let set = NormalizedSet::fit(&records, &features(), MissingPolicy::Drop).unwrap();
        let q = set.normalize_query(&[150.0, 20.0]).unwrap();
        assert!((q[0] - 0.5).abs() < 1e-12);
        assert!((q[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn dimension_mismatch_is_validation_error() {
        let records = sample();
        let set = NormalizedSet::fit(&records, &features(), MissingPolicy::Drop).unwrap();
        assert!(matches!(
            set.normalize_query(&[1.0]),
            Err(AnalysisError::Validation(_))
        ));
    }

    #[test]
    fn single_entity_normalizes_to_zero_vector() {
        let records = vec![record("Solo", 2020, 600.0, 3.0)];
        let set = NormalizedSet::fit(&records, &features(), MissingPolicy::Drop).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.vector(0), &[0.0, 0.0]);
    }

    #[test]
    fn all_rows_dropped_cannot_fit() {
        let mut a = record("A", 2020, 1.0, 1.0);
        a.stats.insert("PA".into(), None);
        let mut b = record("B", 2020, 1.0, 1.0);
        b.stats.insert("WAR".into(), None);
        let records = vec![a, b];
        let err = NormalizedSet::fit(&records, &features(), MissingPolicy::Drop).unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
    }
}
