//! Per-sample weights that balance class frequencies.
//!
//! Each sample of class `c` is weighted `n / (k * n_c)`, where `n` is the sample count,
//! `k` the number of classes present and `n_c` the size of class `c`. Every present
//! class then carries the same total weight, so a rare low-performance class is not
//! drowned out by the common one. Both ensemble families fit with these weights.

/// Balanced class weights for `labels`.
///
/// # Examples
///
/// ```
/// use railpulse_training::weights;
///
/// let w = weights::balanced(&[0, 0, 0, 1], 2);
/// assert_eq!(w, vec![4.0 / 6.0, 4.0 / 6.0, 4.0 / 6.0, 2.0]);
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn balanced(labels: &[usize], n_classes: usize) -> Vec<f64> {
    let counts = class_counts(labels, n_classes);
    let present = counts.iter().filter(|c| **c > 0).count().max(1);
    let n = labels.len() as f64;
    labels
        .iter()
        .map(|&label| n / (present as f64 * counts[label] as f64))
        .collect()
}

/// Number of samples per class, indexed by class.
#[must_use]
pub fn class_counts(labels: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0; n_classes];
    for &label in labels {
        counts[label] += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes_carry_equal_weight() {
        let labels = [0, 0, 0, 0, 0, 0, 1, 1, 2];
        let w = balanced(&labels, 3);
        let per_class = (0..3)
            .map(|c| {
                labels
                    .iter()
                    .zip(&w)
                    .filter(|(l, _)| **l == c)
                    .map(|(_, w)| w)
                    .sum::<f64>()
            })
            .collect::<Vec<_>>();
        for total in &per_class {
            assert!((total - 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_absent_class_is_ignored() {
        let w = balanced(&[0, 0, 2, 2], 3);
        assert_eq!(w, vec![1.0; 4]);
        assert_eq!(class_counts(&[0, 0, 2, 2], 3), vec![2, 0, 2]);
    }
}
