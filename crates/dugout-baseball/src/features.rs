// Feature extraction: turn stat records into dense numeric rows.
//
// Every analysis starts here. Missing cells are resolved up front, either by
// dropping the record or by filling the feature's mean, so later stages only
// ever see complete vectors.

use dugout_core::config::MissingPolicy;
use dugout_core::records::{EntityKey, StatRecord};
use dugout_core::{AnalysisError, Result};
use tracing::{debug, info};

/// One complete feature row with a back-reference to its source record.
#[derive(Debug, Clone)]
pub struct FeatureRow<'a> {
    pub record: &'a StatRecord,
    pub values: Vec<f64>,
}

/// Complete feature rows for a fixed, ordered list of feature names.
#[derive(Debug, Clone)]
pub struct FeatureMatrix<'a> {
    features: Vec<String>,
    rows: Vec<FeatureRow<'a>>,
}

impl<'a> FeatureMatrix<'a> {
    /// Extract `features` from every record, resolving missing values per
    /// `policy`.
    ///
    /// Fails with a validation error if a feature has no observed value in
    /// any record: the column is absent from the input or empty everywhere.
    pub fn build(
        records: &'a [StatRecord],
        features: &[String],
        policy: MissingPolicy,
    ) -> Result<Self> {
        if features.is_empty() {
            return Err(AnalysisError::validation("no features requested"));
        }

        let mut means = Vec::with_capacity(features.len());
        for feature in features {
            let observed: Vec<f64> = records.iter().filter_map(|r| r.stat(feature)).collect();
            if observed.is_empty() {
                return Err(AnalysisError::validation(format!(
                    "feature `{feature}` is absent from every record"
                )));
            }
            means.push(observed.iter().sum::<f64>() / observed.len() as f64);
        }

        let mut rows = Vec::with_capacity(records.len());
        let mut dropped = 0usize;
        let mut imputed = 0usize;
        for record in records {
            let raw: Vec<Option<f64>> = features.iter().map(|f| record.stat(f)).collect();
            if raw.iter().all(Option::is_some) {
                rows.push(FeatureRow {
                    record,
                    values: raw.into_iter().flatten().collect(),
                });
                continue;
            }
            match policy {
                MissingPolicy::Drop => {
                    debug!("dropping {} (missing feature)", record.key());
                    dropped += 1;
                }
                MissingPolicy::ImputeMean => {
                    imputed += 1;
                    let values = raw
                        .iter()
                        .zip(&means)
                        .map(|(v, mean)| v.unwrap_or(*mean))
                        .collect();
                    rows.push(FeatureRow { record, values });
                }
            }
        }

        if dropped > 0 || imputed > 0 {
            info!(
                "feature matrix: {} rows kept, {} dropped, {} imputed",
                rows.len(),
                dropped,
                imputed
            );
        }

        Ok(Self {
            features: features.to_vec(),
            rows,
        })
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn dims(&self) -> usize {
        self.features.len()
    }

    pub fn rows(&self) -> &[FeatureRow<'a>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The source record of row `i`.
    pub fn record(&self, i: usize) -> &'a StatRecord {
        self.rows[i].record
    }

    /// Index of the first row whose record has this key.
    pub fn position(&self, key: &EntityKey) -> Option<usize> {
        self.rows.iter().position(|row| row.record.matches(key))
    }

    /// Copy of the raw values as plain rows (for the numeric stages).
    pub fn values(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(|row| row.values.clone()).collect()
    }
}
