use chrono::{Days, NaiveDate};
use railpulse_dataset::{region::Region, schema::RecordKey};
use railpulse_features::schema::{FeatureSchema, FeatureSet, FeatureVector, LabelScheme};
use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_pcg::Pcg64;

/// Two-feature binary set. A `separable` share of the vectors has its label decided by
/// the sign of the first feature; the rest get a coin-flip label.
pub(crate) fn feature_set(n: usize, separable: f64, seed: u64) -> FeatureSet {
    let mut rng = Pcg64::seed_from_u64(seed);
    let vectors = (0..n)
        .map(|i| {
            let signal = rng.random_range(-1.0..1.0);
            let label = if rng.random_bool(separable) {
                usize::from(signal < 0.0)
            } else {
                usize::from(rng.random_bool(0.5))
            };
            vector(i, signal, rng.random_range(1.0..12.0), label)
        })
        .collect();
    FeatureSet {
        schema: schema(),
        vectors,
    }
}

/// Same layout as [`feature_set`], but every label follows the sign of the first
/// feature except for exactly `flipped` vectors whose label is inverted, so the best
/// achievable accuracy is `1 - flipped / n`.
pub(crate) fn flipped_feature_set(n: usize, flipped: usize, seed: u64) -> FeatureSet {
    let mut rng = Pcg64::seed_from_u64(seed);
    let mut order = (0..n).collect::<Vec<_>>();
    order.shuffle(&mut rng);
    let mut flip = vec![false; n];
    for &i in order.iter().take(flipped) {
        flip[i] = true;
    }
    let vectors = flip
        .iter()
        .enumerate()
        .map(|(i, &inverted)| {
            let signal = rng.random_range(-1.0..1.0);
            let label = usize::from((signal < 0.0) != inverted);
            vector(i, signal, rng.random_range(1.0..12.0), label)
        })
        .collect();
    FeatureSet {
        schema: schema(),
        vectors,
    }
}

fn schema() -> FeatureSchema {
    FeatureSchema::new(
        vec!["punctuality_pct_lag_1".to_owned(), "month".to_owned()],
        LabelScheme::default(),
    )
}

fn vector(i: usize, signal: f64, month: f64, label: usize) -> FeatureVector {
    let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
    let day = u64::try_from(i / Region::ALL.len()).unwrap();
    FeatureVector {
        key: RecordKey {
            date: start.checked_add_days(Days::new(day)).unwrap(),
            region: Region::ALL[i % Region::ALL.len()],
        },
        values: vec![signal, month],
        label,
    }
}
