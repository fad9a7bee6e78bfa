//! Pearson correlation matrices over columns with missing values.

use nalgebra::DMatrix;

/// Pearson correlation between two equally long columns.
///
/// Only positions where both values are present are used. Returns `0.0` when fewer
/// than two complete pairs exist or either column is constant over those pairs.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> f64 {
    let pairs = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .collect::<Vec<_>>();
    if pairs.len() < 2 {
        return 0.0;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in &pairs {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return 0.0;
    }
    (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0)
}

/// Pairwise-complete Pearson correlation matrix of `columns`.
///
/// The diagonal is always `1.0`.
///
/// # Examples
///
/// ```
/// use railpulse_stats::correlation::correlation_matrix;
///
/// let a = vec![Some(1.0), Some(2.0), Some(3.0)];
/// let b = vec![Some(2.0), Some(4.0), Some(6.0)];
/// let m = correlation_matrix(&[a, b]);
/// assert!((m[(0, 1)] - 1.0).abs() < 1e-12);
/// ```
#[must_use]
pub fn correlation_matrix<C>(columns: &[C]) -> DMatrix<f64>
where
    C: AsRef<[Option<f64>]>,
{
    let k = columns.len();
    let mut matrix = DMatrix::identity(k, k);
    for i in 0..k {
        for j in (i + 1)..k {
            let r = pearson(columns[i].as_ref(), columns[j].as_ref());
            matrix[(i, j)] = r;
            matrix[(j, i)] = r;
        }
    }
    matrix
}

/// Frobenius norm of the difference of two equally shaped matrices.
///
/// # Panics
///
/// Panics if the matrices have different shapes.
#[must_use]
pub fn frobenius_difference(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    assert_eq!(a.shape(), b.shape(), "matrix shapes must match");
    (a - b).norm()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pearson_negative_correlation() {
        let x = [Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
        let y = [Some(8.0), Some(6.0), Some(4.0), Some(2.0)];
        assert!((pearson(&x, &y) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_skips_missing_pairs() {
        let x = [Some(1.0), None, Some(3.0), Some(5.0)];
        let y = [Some(1.0), Some(100.0), Some(3.0), None];
        // only (1,1) and (3,3) are complete
        assert!((pearson(&x, &y) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_column_has_zero_correlation() {
        let x = [Some(1.0), Some(1.0), Some(1.0)];
        let y = [Some(1.0), Some(2.0), Some(3.0)];
        assert!(pearson(&x, &y).abs() < f64::EPSILON);
    }

    #[test]
    fn test_frobenius_difference() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.5, 1.0]);
        let b = DMatrix::from_row_slice(2, 2, &[1.0, 0.2, 0.2, 1.0]);
        let expected = (2.0_f64 * 0.3 * 0.3).sqrt();
        assert!((frobenius_difference(&a, &b) - expected).abs() < 1e-12);
        assert!(frobenius_difference(&a, &a).abs() < f64::EPSILON);
    }
}
