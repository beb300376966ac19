//! Seeded train/test split.

use crate::error::MlError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Row indices for each side of a split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n` with `seed` and carve off `ceil(n * test_size)` test rows.
///
/// The same `(n, test_size, seed)` always yields the same split.
pub fn train_test_split(n: usize, test_size: f64, seed: u64) -> Result<SplitIndices, MlError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(MlError::params(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }
    let n_test = test_count(n, test_size);
    if n_test == 0 || n_test >= n {
        return Err(MlError::training(format!(
            "cannot split {n} rows with test_size={test_size}: both sides need at least one row"
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok(SplitIndices {
        train,
        test: indices,
    })
}

fn test_count(n: usize, test_size: f64) -> usize {
    (n as f64 * test_size).ceil() as usize
}

/// Smallest row count whose split keeps two test rows, enough to score R²,
/// and at least one train row. `None` when no count up to 100 000 does.
pub fn min_rows_for_scoring(test_size: f64) -> Option<usize> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return None;
    }
    (3..=100_000).find(|&n| {
        let n_test = test_count(n, test_size);
        n_test >= 2 && n_test < n
    })
}
