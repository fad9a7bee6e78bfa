/// Ranks of a sample with ties resolved to their average rank.
///
/// Ranks are 1-based and returned in the order of the input values.
#[derive(Debug, Clone)]
pub struct Ranks {
    /// Average rank of each input value.
    pub ranks: Vec<f64>,
    /// Sum of `t^3 - t` over every group of `t` tied values.
    ///
    /// Used by tie corrections in rank-based tests.
    pub tie_term: f64,
}

impl Ranks {
    /// Computes average ranks for `values`.
    ///
    /// # Examples
    ///
    /// ```
    /// use railpulse_stats::rank::Ranks;
    ///
    /// let ranks = Ranks::new(&[10.0, 20.0, 20.0, 5.0]);
    /// assert_eq!(ranks.ranks, vec![2.0, 3.5, 3.5, 1.0]);
    /// assert_eq!(ranks.tie_term, 6.0);
    /// ```
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn new(values: &[f64]) -> Self {
        let mut order = (0..values.len()).collect::<Vec<_>>();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

        let mut ranks = vec![0.0; values.len()];
        let mut tie_term = 0.0;
        let mut i = 0;
        while i < order.len() {
            let mut j = i + 1;
            while j < order.len() && values[order[j]] == values[order[i]] {
                j += 1;
            }
            // positions i..j (0-based) share ranks i+1..=j
            let avg = (i + 1 + j) as f64 / 2.0;
            for &idx in &order[i..j] {
                ranks[idx] = avg;
            }
            let t = (j - i) as f64;
            tie_term += t.powi(3) - t;
            i = j;
        }

        Self { ranks, tie_term }
    }
}
