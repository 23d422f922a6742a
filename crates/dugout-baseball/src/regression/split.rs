// Seeded train/test partition of row indices.

use dugout_core::{AnalysisError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n` and hold out `ceil(n * test_fraction)` rows for testing.
///
/// Both sides always get at least one row.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<Split> {
    if test_fraction.is_nan() || test_fraction <= 0.0 || test_fraction >= 1.0 {
        return Err(AnalysisError::validation(format!(
            "test fraction must be in (0, 1), got {test_fraction}"
        )));
    }
    if n < 2 {
        return Err(AnalysisError::validation(format!(
            "need at least 2 rows to split, got {n}"
        )));
    }

    let test_len = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n - 1);
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(test_len);
    Ok(Split {
        train,
        test: indices,
    })
}
