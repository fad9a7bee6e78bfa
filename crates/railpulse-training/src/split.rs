//! Stratified partitions of sample indices.
//!
//! Both helpers shuffle each class separately, so every partition keeps roughly the
//! class proportions of the whole. Returned index lists are sorted.

use rand::{Rng, seq::SliceRandom};

fn shuffled_by_class<R>(labels: &[usize], n_classes: usize, rng: &mut R) -> Vec<Vec<usize>>
where
    R: Rng + ?Sized,
{
    let mut by_class = vec![vec![]; n_classes];
    for (i, &label) in labels.iter().enumerate() {
        by_class[label].push(i);
    }
    for members in &mut by_class {
        members.shuffle(rng);
    }
    by_class
}

/// Splits indices into `(kept, held_out)` with `fraction` of each class held out.
///
/// The held-out count of a class is rounded, but a class with at least two members
/// always keeps one and holds out one when `fraction > 0`.
#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn stratified_split<R>(
    labels: &[usize],
    n_classes: usize,
    fraction: f64,
    rng: &mut R,
) -> (Vec<usize>, Vec<usize>)
where
    R: Rng + ?Sized,
{
    let mut kept = vec![];
    let mut held_out = vec![];
    for members in shuffled_by_class(labels, n_classes, rng) {
        let n = members.len();
        let mut take = (fraction * n as f64).round() as usize;
        if n >= 2 && fraction > 0.0 {
            take = take.clamp(1, n - 1);
        }
        let take = take.min(n);
        held_out.extend_from_slice(&members[..take]);
        kept.extend_from_slice(&members[take..]);
    }
    kept.sort_unstable();
    held_out.sort_unstable();
    (kept, held_out)
}

/// Assigns every index to one of `k` folds.
///
/// Classes are dealt round-robin, continuing where the previous class stopped, so fold
/// sizes differ by at most one.
pub fn stratified_folds<R>(labels: &[usize], n_classes: usize, k: usize, rng: &mut R) -> Vec<Vec<usize>>
where
    R: Rng + ?Sized,
{
    assert!(k > 0);
    let mut folds = vec![vec![]; k];
    let mut next = 0;
    for members in shuffled_by_class(labels, n_classes, rng) {
        for i in members {
            folds[next].push(i);
            next = (next + 1) % k;
        }
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    folds
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    use super::*;

    fn labels() -> Vec<usize> {
        (0..100).map(|i| usize::from(i % 5 == 0)).collect()
    }

    #[test]
    fn test_split_preserves_proportions() {
        let labels = labels();
        let mut rng = Pcg64::seed_from_u64(11);
        let (kept, held_out) = stratified_split(&labels, 2, 0.2, &mut rng);
        assert_eq!(kept.len() + held_out.len(), 100);
        assert_eq!(held_out.len(), 20);
        assert_eq!(held_out.iter().filter(|&&i| labels[i] == 1).count(), 4);
        assert!(kept.iter().all(|i| !held_out.contains(i)));
    }

    #[test]
    fn test_small_class_keeps_a_member() {
        let labels = vec![0, 0, 0, 0, 0, 0, 0, 0, 1, 1];
        let mut rng = Pcg64::seed_from_u64(2);
        let (kept, held_out) = stratified_split(&labels, 2, 0.2, &mut rng);
        assert_eq!(kept.iter().filter(|&&i| labels[i] == 1).count(), 1);
        assert_eq!(held_out.iter().filter(|&&i| labels[i] == 1).count(), 1);
    }

    #[test]
    fn test_folds_cover_every_index_once() {
        let labels = labels();
        let mut rng = Pcg64::seed_from_u64(5);
        let folds = stratified_folds(&labels, 2, 5, &mut rng);
        let mut all = folds.iter().flatten().copied().collect::<Vec<_>>();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
        for fold in &folds {
            assert_eq!(fold.len(), 20);
            assert_eq!(fold.iter().filter(|&&i| labels[i] == 1).count(), 4);
        }
    }
}
