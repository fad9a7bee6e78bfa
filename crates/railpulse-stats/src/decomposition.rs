//! Classical additive seasonal-trend decomposition.
//!
//! A series `y` is split into `y = trend + seasonal + residual`:
//!
//! 1. **Trend**: centered moving average over one period (a 2×m moving average when the
//!    period is even). The first and last half-period have no trend value.
//! 2. **Seasonal**: mean of the detrended values at each phase of the period, shifted so
//!    the seasonal pattern sums to zero over one period.
//! 3. **Residual**: what is left, defined only where the trend is defined.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum DecompositionError {
    #[display("period must be at least 2, got {period}")]
    InvalidPeriod { period: usize },
    #[display("series of length {len} is shorter than two periods of {period}")]
    SeriesTooShort { len: usize, period: usize },
}

/// Output of [`decompose_additive`]; all vectors have the length of the input series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    pub period: usize,
    pub trend: Vec<Option<f64>>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<Option<f64>>,
}

impl Decomposition {
    /// Standard deviation of the defined residuals.
    #[must_use]
    pub fn residual_std_dev(&self) -> Option<f64> {
        let residuals = self.residual.iter().flatten().copied().collect::<Vec<_>>();
        crate::descriptive::sample_std_dev(&residuals)
    }

    /// Indices whose residual magnitude exceeds `sigma` residual standard deviations.
    #[must_use]
    pub fn outliers(&self, sigma: f64) -> Vec<usize> {
        let Some(std_dev) = self.residual_std_dev() else {
            return vec![];
        };
        if std_dev <= 0.0 {
            return vec![];
        }
        self.residual
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.filter(|r| r.abs() > sigma * std_dev).map(|_| i))
            .collect()
    }
}

/// Decomposes `series` with the given seasonal `period`.
///
/// # Examples
///
/// ```
/// use railpulse_stats::decomposition::decompose_additive;
///
/// // weekly pattern on top of a linear trend
/// let series = (0..28)
///     .map(|i| f64::from(i) + [3.0, -1.0, -1.0, -1.0, 0.0, 0.0, 0.0][i as usize % 7])
///     .collect::<Vec<_>>();
/// let d = decompose_additive(&series, 7).unwrap();
/// assert!((d.seasonal[0] - 3.0).abs() < 1e-9);
/// ```
#[expect(clippy::cast_precision_loss)]
pub fn decompose_additive(
    series: &[f64],
    period: usize,
) -> Result<Decomposition, DecompositionError> {
    if period < 2 {
        return Err(DecompositionError::InvalidPeriod { period });
    }
    if series.len() < 2 * period {
        return Err(DecompositionError::SeriesTooShort {
            len: series.len(),
            period,
        });
    }

    let trend = centered_moving_average(series, period);

    let mut phase_sums = vec![0.0; period];
    let mut phase_counts = vec![0_usize; period];
    for (i, (y, t)) in series.iter().zip(&trend).enumerate() {
        if let Some(t) = t {
            phase_sums[i % period] += y - t;
            phase_counts[i % period] += 1;
        }
    }
    let mut pattern = phase_sums
        .iter()
        .zip(&phase_counts)
        .map(|(s, &c)| if c == 0 { 0.0 } else { s / c as f64 })
        .collect::<Vec<_>>();
    let pattern_mean = pattern.iter().sum::<f64>() / period as f64;
    for p in &mut pattern {
        *p -= pattern_mean;
    }

    let seasonal = (0..series.len())
        .map(|i| pattern[i % period])
        .collect::<Vec<_>>();
    let residual = series
        .iter()
        .zip(&trend)
        .zip(&seasonal)
        .map(|((y, t), s)| t.map(|t| y - t - s))
        .collect();

    Ok(Decomposition {
        period,
        trend,
        seasonal,
        residual,
    })
}

#[expect(clippy::cast_precision_loss)]
fn centered_moving_average(series: &[f64], period: usize) -> Vec<Option<f64>> {
    let half = period / 2;
    let mut trend = vec![None; series.len()];
    for (i, slot) in trend.iter_mut().enumerate() {
        if i < half || i + half >= series.len() {
            continue;
        }
        let value = if period % 2 == 1 {
            series[i - half..=i + half].iter().sum::<f64>() / period as f64
        } else {
            // 2×m moving average: half weight on both ends
            let inner = series[i - half + 1..i + half].iter().sum::<f64>();
            (inner + 0.5 * (series[i - half] + series[i + half])) / period as f64
        };
        *slot = Some(value);
    }
    trend
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekly_series(weeks: usize) -> Vec<f64> {
        let pattern = [2.0, 1.0, 0.0, -1.0, -2.0, 0.5, -0.5];
        (0..weeks * 7)
            .map(|i| 50.0 + 0.1 * i as f64 + pattern[i % 7])
            .collect()
    }

    #[test]
    fn test_recovers_seasonal_pattern() {
        let series = weekly_series(8);
        let d = decompose_additive(&series, 7).unwrap();
        let expected = [2.0, 1.0, 0.0, -1.0, -2.0, 0.5, -0.5];
        for (i, e) in expected.iter().enumerate() {
            assert!((d.seasonal[i] - e).abs() < 1e-9, "phase {i}");
        }
        for r in d.residual.iter().flatten() {
            assert!(r.abs() < 1e-9);
        }
        assert!(d.trend[0].is_none());
        assert!(d.trend[3].is_some());
        assert!(d.trend[series.len() - 3].is_none());
    }

    #[test]
    fn test_even_period_uses_two_by_m_average() {
        let series = (0..12).map(f64::from).collect::<Vec<_>>();
        let d = decompose_additive(&series, 4).unwrap();
        // linear series: centered trend equals the value itself
        assert!((d.trend[5].unwrap() - 5.0).abs() < 1e-12);
        assert!(d.trend[1].is_none());
        assert!(d.trend[10].is_none());
    }

    #[test]
    fn test_flags_injected_outlier() {
        let mut series = weekly_series(10);
        // small deterministic wiggle so residual variance is non-zero
        for (i, v) in series.iter_mut().enumerate() {
            *v += if i % 3 == 0 { 0.2 } else { -0.1 };
        }
        series[30] += 25.0;
        let d = decompose_additive(&series, 7).unwrap();
        let outliers = d.outliers(3.0);
        assert_eq!(outliers, vec![30]);
    }

    #[test]
    fn test_rejects_short_series() {
        let series = vec![1.0; 10];
        assert_eq!(
            decompose_additive(&series, 7),
            Err(DecompositionError::SeriesTooShort { len: 10, period: 7 })
        );
        assert_eq!(
            decompose_additive(&series, 1),
            Err(DecompositionError::InvalidPeriod { period: 1 })
        );
    }
}
