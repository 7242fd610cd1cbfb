// ============================================================
// Layer 4 — Holdout Splitter
// ============================================================
// Picks which frames of a dataset are held out to measure
// reconstruction on data the VAE never trained on. Works on
// sample indices so the pixel buffer is copied only once, when
// the dataset gathers the two halves.

use rand::{seq::SliceRandom, Rng};

/// Split `0..len` into (train, holdout) index lists.
///
/// `round(len * holdout_fraction)` indices are drawn at random for the
/// holdout set. Both lists come back in ascending order so frames keep
/// their on-disk order within each half.
pub fn holdout_indices<R: Rng + ?Sized>(
    len:              usize,
    holdout_fraction: f64,
    rng:              &mut R,
) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(rng);

    let holdout = ((len as f64) * holdout_fraction.clamp(0.0, 1.0)).round() as usize;
    let mut test  = indices.split_off(len - holdout.min(len));
    let mut train = indices;
    train.sort_unstable();
    test.sort_unstable();

    tracing::debug!("Holding out {} of {} frames", test.len(), len);
    (train, test)
}
