//! The master dataset and the builder that merges normalized rows into it.
//!
//! Rows from every source table are grouped by [`RecordKey`]. For each field the value
//! from the highest-precedence table wins; disagreeing lower-precedence values are
//! counted as conflicts. The result is validated against the schema and, if configured,
//! against a coverage requirement.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    normalize::NormalizedRow,
    region::Region,
    schema::{self, Field, FieldValues, RecordKey, SCHEMA_VERSION, SchemaViolation},
    source::SourceMapping,
};

const CONFLICT_TOLERANCE: f64 = 1e-9;

/// A source file and the mapping used to read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: std::path::PathBuf,
    #[serde(flatten)]
    pub mapping: SourceMapping,
}

fn all_regions() -> Vec<Region> {
    Region::ALL.to_vec()
}

fn default_strict() -> bool {
    true
}

/// Every listed region must have a record on every day in `start..=end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRequirement {
    #[serde(default = "all_regions")]
    pub regions: Vec<Region>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Missing keys fail the build when set; otherwise they are reported as gaps.
    #[serde(default = "default_strict")]
    pub strict: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub sources: Vec<SourceConfig>,
    /// Table ids, highest precedence first. Unlisted tables rank after listed ones in
    /// table-id order.
    pub precedence: Vec<String>,
    pub coverage: Option<CoverageRequirement>,
    /// Extra region spellings on top of the built-in aliases.
    pub region_aliases: BTreeMap<String, Region>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterRecord {
    pub key: RecordKey,
    pub values: FieldValues,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub input_rows: usize,
    pub rows_per_table: BTreeMap<String, usize>,
    /// Rows ignored because an earlier row of the same table had the same key.
    pub duplicate_rows: usize,
    /// Per field, how many lower-precedence values disagreed with the winner.
    pub conflicts: BTreeMap<Field, usize>,
    pub coverage_gaps: Vec<RecordKey>,
}

/// Unified analytical dataset: unique keys, sorted by (date, region).
#[derive(Debug, Clone, PartialEq)]
pub struct MasterDataset {
    schema_version: u32,
    precedence: Vec<String>,
    records: Vec<MasterRecord>,
    report: BuildReport,
}

impl MasterDataset {
    /// Creates a dataset, sorting `records` and validating each against the schema.
    pub fn new(
        precedence: Vec<String>,
        mut records: Vec<MasterRecord>,
        report: BuildReport,
    ) -> Result<Self, SchemaViolation> {
        records.sort_by_key(|r| r.key);
        for pair in records.windows(2) {
            if pair[0].key == pair[1].key {
                return Err(SchemaViolation::DuplicateKey { key: pair[0].key });
            }
        }
        for record in &records {
            schema::validate_record(record.key, &record.values)?;
        }
        Ok(Self {
            schema_version: SCHEMA_VERSION,
            precedence,
            records,
            report,
        })
    }

    #[must_use]
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    #[must_use]
    pub fn precedence(&self) -> &[String] {
        &self.precedence
    }

    #[must_use]
    pub fn records(&self) -> &[MasterRecord] {
        &self.records
    }

    #[must_use]
    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &RecordKey) -> Option<&MasterRecord> {
        self.records
            .binary_search_by(|r| r.key.cmp(key))
            .ok()
            .map(|i| &self.records[i])
    }

    pub fn by_region(&self, region: Region) -> impl Iterator<Item = &MasterRecord> + '_ {
        self.records.iter().filter(move |r| r.key.region == region)
    }

    /// Values of `field` in record order; nulls are `None`.
    #[must_use]
    pub fn column(&self, field: Field) -> Vec<Option<f64>> {
        self.records.iter().map(|r| r.values.get(field)).collect()
    }

    #[must_use]
    pub fn regions(&self) -> BTreeSet<Region> {
        self.records.iter().map(|r| r.key.region).collect()
    }

    #[must_use]
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.records.first()?.key.date, self.records.last()?.key.date))
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum BuildError {
    #[display("merged record violates the schema")]
    Schema {
        #[error(source)]
        violation: SchemaViolation,
    },
    #[display("coverage incomplete: {region} has no record on {date} ({missing} keys missing in total)")]
    IncompleteCoverage {
        region: Region,
        date: NaiveDate,
        missing: usize,
    },
    #[display("coverage range starts on {start}, after its end {end}")]
    InvalidCoverageRange { start: NaiveDate, end: NaiveDate },
}

/// Merges normalized rows into a [`MasterDataset`].
///
/// Identical rows and configuration always produce an identical dataset.
///
/// # Examples
///
/// ```
/// use railpulse_dataset::{
///     master::{DatasetConfig, MasterDatasetBuilder},
///     normalize::NormalizedRow,
///     region::Region,
///     schema::{Field, FieldValues, RecordKey},
/// };
///
/// let key = RecordKey {
///     date: chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
///     region: Region::London,
/// };
/// let row = |table: &str, value| NormalizedRow {
///     table: table.to_owned(),
///     line: 2,
///     key,
///     values: [(Field::PunctualityPct, value)].into_iter().collect(),
/// };
/// let config = DatasetConfig {
///     precedence: vec!["official".to_owned()],
///     ..DatasetConfig::default()
/// };
/// let dataset = MasterDatasetBuilder::new(&config)
///     .build(vec![row("scraped", 80.0), row("official", 82.0)])
///     .unwrap();
/// assert_eq!(dataset.records()[0].values.get(Field::PunctualityPct), Some(82.0));
/// assert_eq!(dataset.report().conflicts[&Field::PunctualityPct], 1);
/// ```
#[derive(Debug)]
pub struct MasterDatasetBuilder<'a> {
    config: &'a DatasetConfig,
}

impl<'a> MasterDatasetBuilder<'a> {
    #[must_use]
    pub fn new(config: &'a DatasetConfig) -> Self {
        Self { config }
    }

    fn rank<'t>(&self, table: &'t str) -> (usize, &'t str) {
        let listed = self.config.precedence.iter().position(|t| t == table);
        (listed.unwrap_or(usize::MAX), table)
    }

    pub fn build(&self, mut rows: Vec<NormalizedRow>) -> Result<MasterDataset, BuildError> {
        let mut report = BuildReport {
            input_rows: rows.len(),
            ..BuildReport::default()
        };
        for row in &rows {
            *report.rows_per_table.entry(row.table.clone()).or_default() += 1;
        }

        rows.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then_with(|| self.rank(&a.table).cmp(&self.rank(&b.table)))
                .then_with(|| a.line.cmp(&b.line))
        });

        let mut records = vec![];
        let mut start = 0;
        while start < rows.len() {
            let key = rows[start].key;
            let end = start + rows[start..].partition_point(|r| r.key == key);
            let group = dedup_tables(&rows[start..end], &mut report.duplicate_rows);
            records.push(MasterRecord {
                key,
                values: merge_group(&group, &mut report.conflicts),
            });
            start = end;
        }

        if let Some(coverage) = &self.config.coverage {
            report.coverage_gaps = check_coverage(coverage, &records)?;
        }

        let total_conflicts = report.conflicts.values().sum::<usize>();
        let precedence = self.config.precedence.clone();
        let dataset = MasterDataset::new(precedence, records, report)
            .map_err(|violation| BuildError::Schema { violation })?;
        tracing::info!(
            records = dataset.len(),
            input_rows = dataset.report().input_rows,
            duplicates = dataset.report().duplicate_rows,
            conflicts = total_conflicts,
            "built master dataset"
        );
        Ok(dataset)
    }
}

/// Keeps the first row of each table; `group` is sorted by precedence then line.
fn dedup_tables<'r>(group: &'r [NormalizedRow], duplicates: &mut usize) -> Vec<&'r NormalizedRow> {
    let mut kept: Vec<&NormalizedRow> = vec![];
    for row in group {
        if kept.iter().any(|k| k.table == row.table) {
            tracing::debug!(table = %row.table, line = row.line, key = %row.key, "duplicate row ignored");
            *duplicates += 1;
        } else {
            kept.push(row);
        }
    }
    kept
}

fn merge_group(group: &[&NormalizedRow], conflicts: &mut BTreeMap<Field, usize>) -> FieldValues {
    let mut values = FieldValues::new();
    for field in Field::ALL {
        let mut present = group.iter().filter_map(|row| row.values.get(field));
        let Some(winner) = present.next() else {
            continue;
        };
        let disagreeing = present
            .filter(|v| (v - winner).abs() > CONFLICT_TOLERANCE)
            .count();
        if disagreeing > 0 {
            *conflicts.entry(field).or_default() += disagreeing;
        }
        values.set(field, winner);
    }
    values
}

fn check_coverage(
    coverage: &CoverageRequirement,
    records: &[MasterRecord],
) -> Result<Vec<RecordKey>, BuildError> {
    if coverage.start > coverage.end {
        return Err(BuildError::InvalidCoverageRange {
            start: coverage.start,
            end: coverage.end,
        });
    }
    let present = records.iter().map(|r| r.key).collect::<BTreeSet<_>>();
    let regions = coverage.regions.iter().copied().collect::<BTreeSet<_>>();
    let gaps = coverage
        .start
        .iter_days()
        .take_while(|d| *d <= coverage.end)
        .flat_map(|date| regions.iter().map(move |&region| RecordKey { date, region }))
        .filter(|key| !present.contains(key))
        .collect::<Vec<_>>();

    if let Some(first) = gaps.first() {
        if coverage.strict {
            return Err(BuildError::IncompleteCoverage {
                region: first.region,
                date: first.date,
                missing: gaps.len(),
            });
        }
        tracing::warn!(
            missing = gaps.len(),
            first = %first,
            "master dataset has coverage gaps"
        );
    }
    Ok(gaps)
}
