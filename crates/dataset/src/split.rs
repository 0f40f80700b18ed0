//! Seeded train/validation split

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Sample indices assigned to each side of a split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Shuffle `0..len` with `seed` and hold out `validation_fraction` of it
///
/// The training side gets `floor(len * (1 - validation_fraction))` samples.
/// The same seed always produces the same partition.
pub fn split_indices(len: usize, validation_fraction: f64, seed: u64) -> Split {
    let fraction = validation_fraction.clamp(0.0, 1.0);
    let train_len = ((len as f64) * (1.0 - fraction)).floor() as usize;

    let mut indices: Vec<usize> = (0..len).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let validation = indices.split_off(train_len.min(len));

    tracing::debug!(
        total = len,
        train = indices.len(),
        validation = validation.len(),
        seed,
        "Split dataset"
    );

    Split {
        train: indices,
        validation,
    }
}
