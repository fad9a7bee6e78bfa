//! Between-group and two-sample hypothesis tests.
//!
//! - [`one_way_anova`]: parametric test for equal group means (F statistic)
//! - [`kruskal_wallis`]: rank-based test for equal group distributions (H statistic)
//! - [`ks_two_sample`]: Kolmogorov-Smirnov two-sample test (D statistic)
//!
//! The functions only reject inputs that make the statistic undefined (fewer than two
//! groups, empty groups, zero variance). Callers that need stricter sample-size rules
//! apply them before calling.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor};

use crate::rank::Ranks;

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum HypothesisError {
    #[display("at least 2 groups are required, got {groups}")]
    TooFewGroups { groups: usize },
    #[display("group #{index} is empty")]
    EmptyGroup { index: usize },
    #[display("{observations} observations are not enough for {groups} groups")]
    TooFewObservations { observations: usize, groups: usize },
    #[display("all observations are identical; the statistic is undefined")]
    DegenerateVariance,
    #[display("invalid distribution parameters: {reason}")]
    Distribution { reason: String },
}

/// Result of a one-way analysis of variance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnovaResult {
    pub f_statistic: f64,
    pub df_between: f64,
    pub df_within: f64,
    pub p_value: f64,
    /// Eta squared: between-group sum of squares over total sum of squares.
    pub eta_squared: f64,
}

/// Result of a Kruskal-Wallis H test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KruskalWallisResult {
    /// Tie-corrected H statistic.
    pub h_statistic: f64,
    pub df: f64,
    pub p_value: f64,
    /// Eta squared based on H: `(H - k + 1) / (N - k)`, floored at zero.
    pub eta_squared: f64,
}

/// Result of a Kolmogorov-Smirnov two-sample test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KsResult {
    /// Maximum absolute distance between the two empirical CDFs.
    pub statistic: f64,
    /// Asymptotic p-value.
    pub p_value: f64,
}

fn check_groups<G>(groups: &[G]) -> Result<usize, HypothesisError>
where
    G: AsRef<[f64]>,
{
    if groups.len() < 2 {
        return Err(HypothesisError::TooFewGroups {
            groups: groups.len(),
        });
    }
    if let Some(index) = groups.iter().position(|g| g.as_ref().is_empty()) {
        return Err(HypothesisError::EmptyGroup { index });
    }
    let observations = groups.iter().map(|g| g.as_ref().len()).sum::<usize>();
    if observations <= groups.len() {
        return Err(HypothesisError::TooFewObservations {
            observations,
            groups: groups.len(),
        });
    }
    Ok(observations)
}

/// Runs a one-way ANOVA across `groups`.
///
/// # Examples
///
/// ```
/// use railpulse_stats::hypothesis::one_way_anova;
///
/// let a = [1.0, 2.0, 3.0];
/// let b = [11.0, 12.0, 13.0];
/// let result = one_way_anova(&[&a[..], &b[..]]).unwrap();
/// assert!(result.p_value < 0.001);
/// ```
#[expect(clippy::cast_precision_loss)]
pub fn one_way_anova<G>(groups: &[G]) -> Result<AnovaResult, HypothesisError>
where
    G: AsRef<[f64]>,
{
    let observations = check_groups(groups)?;
    let n = observations as f64;
    let k = groups.len() as f64;

    let grand_mean = groups
        .iter()
        .flat_map(|g| g.as_ref().iter())
        .sum::<f64>()
        / n;

    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for group in groups {
        let values = group.as_ref();
        let len = values.len() as f64;
        let mean = values.iter().sum::<f64>() / len;
        ss_between += len * (mean - grand_mean).powi(2);
        ss_within += values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    }

    let df_between = k - 1.0;
    let df_within = n - k;
    let ss_total = ss_between + ss_within;
    if ss_total <= 0.0 {
        return Err(HypothesisError::DegenerateVariance);
    }

    let (f_statistic, p_value) = if ss_within <= 0.0 {
        // perfectly separated groups
        (f64::INFINITY, 0.0)
    } else {
        let f = (ss_between / df_between) / (ss_within / df_within);
        let dist = FisherSnedecor::new(df_between, df_within).map_err(|e| {
            HypothesisError::Distribution {
                reason: e.to_string(),
            }
        })?;
        (f, (1.0 - dist.cdf(f)).clamp(0.0, 1.0))
    };

    Ok(AnovaResult {
        f_statistic,
        df_between,
        df_within,
        p_value,
        eta_squared: ss_between / ss_total,
    })
}

/// Runs a Kruskal-Wallis H test across `groups`.
///
/// Tied values receive average ranks and H is divided by the usual tie correction.
#[expect(clippy::cast_precision_loss)]
pub fn kruskal_wallis<G>(groups: &[G]) -> Result<KruskalWallisResult, HypothesisError>
where
    G: AsRef<[f64]>,
{
    let observations = check_groups(groups)?;
    let n = observations as f64;
    let k = groups.len() as f64;

    let pooled = groups
        .iter()
        .flat_map(|g| g.as_ref().iter().copied())
        .collect::<Vec<_>>();
    let ranks = Ranks::new(&pooled);

    let correction = 1.0 - ranks.tie_term / (n.powi(3) - n);
    if correction <= 0.0 {
        return Err(HypothesisError::DegenerateVariance);
    }

    let mut offset = 0;
    let mut rank_term = 0.0;
    for group in groups {
        let len = group.as_ref().len();
        let rank_sum = ranks.ranks[offset..offset + len].iter().sum::<f64>();
        rank_term += rank_sum.powi(2) / len as f64;
        offset += len;
    }

    let h = (12.0 / (n * (n + 1.0)) * rank_term - 3.0 * (n + 1.0)) / correction;
    let h_statistic = h.max(0.0);
    let df = k - 1.0;
    let dist = ChiSquared::new(df).map_err(|e| HypothesisError::Distribution {
        reason: e.to_string(),
    })?;
    let p_value = (1.0 - dist.cdf(h_statistic)).clamp(0.0, 1.0);

    Ok(KruskalWallisResult {
        h_statistic,
        df,
        p_value,
        eta_squared: ((h_statistic - k + 1.0) / (n - k)).max(0.0),
    })
}

/// Runs a two-sample Kolmogorov-Smirnov test.
///
/// Returns `None` if either sample is empty. Ties are handled by advancing both
/// empirical CDFs past equal values before measuring their distance.
///
/// # Examples
///
/// ```
/// use railpulse_stats::hypothesis::ks_two_sample;
///
/// let a = [0.1, 0.4, 0.7, 0.9];
/// let result = ks_two_sample(&a, &a).unwrap();
/// assert_eq!(result.statistic, 0.0);
/// assert_eq!(result.p_value, 1.0);
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn ks_two_sample(a: &[f64], b: &[f64]) -> Option<KsResult> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let n = a.len() as f64;
    let m = b.len() as f64;
    let (mut i, mut j) = (0, 0);
    let mut d: f64 = 0.0;
    while i < a.len() && j < b.len() {
        let x = f64::min(a[i], b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n - j as f64 / m).abs());
    }

    let en = (n * m / (n + m)).sqrt();
    let lambda = (en + 0.12 + 0.11 / en) * d;
    Some(KsResult {
        statistic: d,
        p_value: kolmogorov_survival(lambda),
    })
}

/// Survival function of the Kolmogorov distribution, `Q_KS(lambda)`.
fn kolmogorov_survival(lambda: f64) -> f64 {
    const EPS_TERM: f64 = 0.001;
    const EPS_SUM: f64 = 1.0e-8;

    let a2 = -2.0 * lambda * lambda;
    let mut sign = 2.0;
    let mut sum = 0.0;
    let mut previous: f64 = 0.0;
    for j in 1..=100_i32 {
        let term = sign * (a2 * f64::from(j * j)).exp();
        sum += term;
        if term.abs() <= EPS_TERM * previous || term.abs() <= EPS_SUM * sum {
            return sum.clamp(0.0, 1.0);
        }
        sign = -sign;
        previous = term.abs();
    }
    // series does not converge for tiny lambda, where the distributions coincide
    1.0
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_distr::{Distribution as _, Normal};
    use rand_pcg::Pcg64;

    use super::*;

    #[test]
    fn test_anova_rejects_single_group() {
        let only = vec![1.0, 2.0, 3.0];
        assert_eq!(
            one_way_anova(&[only]),
            Err(HypothesisError::TooFewGroups { groups: 1 })
        );
    }

    #[test]
    fn test_anova_matches_textbook_example() {
        // F = 42408 / 4932, df = (2, 12)
        let a = [6.0, 8.0, 4.0, 5.0, 3.0];
        let b = [8.0, 12.0, 9.0, 11.0, 6.0];
        let c = [13.0, 9.0, 11.0, 8.0, 12.0];
        let result = one_way_anova(&[&a[..], &b[..], &c[..]]).unwrap();
        assert!((result.f_statistic - 8.598_540_146).abs() < 1e-6);
        assert!((result.df_between - 2.0).abs() < f64::EPSILON);
        assert!((result.df_within - 12.0).abs() < f64::EPSILON);
        assert!(result.p_value > 0.001 && result.p_value < 0.01);
    }

    #[test]
    fn test_anova_identical_values_are_degenerate() {
        let a = [1.0, 1.0];
        let b = [1.0, 1.0];
        assert_eq!(
            one_way_anova(&[&a[..], &b[..]]),
            Err(HypothesisError::DegenerateVariance)
        );
    }

    #[test]
    fn test_kruskal_wallis_detects_shift() {
        let mut rng = Pcg64::seed_from_u64(7);
        let low = Normal::new(0.0, 1.0).unwrap();
        let high = Normal::new(3.0, 1.0).unwrap();
        let a = (0..40).map(|_| low.sample(&mut rng)).collect::<Vec<_>>();
        let b = (0..40).map(|_| high.sample(&mut rng)).collect::<Vec<_>>();
        let result = kruskal_wallis(&[a, b]).unwrap();
        assert!(result.p_value < 1e-6);
        assert!(result.eta_squared > 0.3);
    }

    #[test]
    fn test_kruskal_wallis_handles_ties() {
        let a = [1.0, 1.0, 2.0, 2.0];
        let b = [2.0, 3.0, 3.0, 3.0];
        let result = kruskal_wallis(&[&a[..], &b[..]]).unwrap();
        assert!(result.h_statistic > 0.0);
        assert!(result.p_value > 0.0 && result.p_value < 1.0);
    }

    #[test]
    fn test_ks_identical_samples() {
        let a = [3.0, 1.0, 2.0, 2.0, 5.0];
        let result = ks_two_sample(&a, &a).unwrap();
        assert!(result.statistic.abs() < f64::EPSILON);
        assert!((result.p_value - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ks_disjoint_samples() {
        let a = (0..50).map(f64::from).collect::<Vec<_>>();
        let b = (100..150).map(f64::from).collect::<Vec<_>>();
        let result = ks_two_sample(&a, &b).unwrap();
        assert!((result.statistic - 1.0).abs() < f64::EPSILON);
        assert!(result.p_value < 1e-10);
    }

    #[test]
    fn test_ks_same_distribution_is_not_rejected() {
        let mut rng = Pcg64::seed_from_u64(42);
        let normal = Normal::new(10.0, 2.0).unwrap();
        let a = (0..500).map(|_| normal.sample(&mut rng)).collect::<Vec<_>>();
        let b = (0..500).map(|_| normal.sample(&mut rng)).collect::<Vec<_>>();
        let result = ks_two_sample(&a, &b).unwrap();
        assert!(result.p_value > 0.01);
    }

    #[test]
    fn test_ks_empty_sample() {
        assert!(ks_two_sample(&[], &[1.0]).is_none());
    }
}
