use chrono::{Days, NaiveDate};
use railpulse_dataset::{
    master::{BuildReport, MasterDataset, MasterRecord},
    region::Region,
    schema::{Field, FieldValues, RecordKey},
};
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use rand_pcg::Pcg64;

/// `days` days of records for every region. Punctuality and cancellation percentage
/// are strongly anti-correlated. With `extras`, records also carry an independent
/// `trains_planned` count and a `precipitation_mm` value that is missing about a
/// third of the time.
pub(crate) fn dataset(days: u64, seed: u64, extras: bool) -> MasterDataset {
    let mut rng = Pcg64::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let mut records = vec![];
    for day in 0..days {
        for region in Region::ALL {
            let base: f64 = StandardNormal.sample(&mut rng);
            let noise: f64 = StandardNormal.sample(&mut rng);
            let mut values = FieldValues::from_iter([
                (Field::PunctualityPct, (88.0 + 4.0 * base).clamp(0.0, 100.0)),
                (
                    Field::CancellationPct,
                    (3.0 - 1.2 * base + 0.3 * noise).clamp(0.0, 100.0),
                ),
            ]);
            if extras {
                values.set(Field::TrainsPlanned, f64::from(rng.random_range(800_u32..1200)));
                if rng.random_bool(0.7) {
                    values.set(Field::PrecipitationMm, rng.random_range(0.0..20.0));
                }
            }
            records.push(MasterRecord {
                key: RecordKey {
                    date: start.checked_add_days(Days::new(day)).unwrap(),
                    region,
                },
                values,
            });
        }
    }
    MasterDataset::new(vec![], records, BuildReport::default()).unwrap()
}
