//! Execution order planning.

use rand::seq::SliceRandom;
use rand::Rng;

/// Returns the order to visit `count` records in.
///
/// Identity order unless `shuffle` is set, in which case the permutation is
/// drawn from the thread-local generator and is not reproducible.
pub fn plan(count: usize, shuffle: bool) -> Vec<usize> {
    plan_with_rng(count, shuffle, &mut rand::rng())
}

/// Like [`plan`], drawing the permutation from `rng`.
pub fn plan_with_rng<R: Rng + ?Sized>(count: usize, shuffle: bool, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..count).collect();
    if shuffle {
        order.shuffle(rng);
    }
    order
}
