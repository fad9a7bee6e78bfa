//! Schema normalization: raw source rows into canonical, validated rows.
//!
//! Each [`SourceTable`] is read through its [`SourceMapping`]:
//!
//! - the date column is parsed with the mapping's `chrono` format,
//! - the region column is resolved through [`RegionAliases`],
//! - every mapped column is parsed, converted from its declared unit to the field's
//!   canonical unit, and checked against the field's valid range.
//!
//! Blank cells are nulls. Anything else that cannot be normalized is an error naming the
//! table and line; no row is ever dropped silently.

use chrono::NaiveDate;

use crate::{
    region::RegionAliases,
    schema::{Field, FieldValues, RecordKey, Unit},
    source::{SourceMapping, SourceTable},
};

/// A source row after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub table: String,
    pub line: usize,
    pub key: RecordKey,
    pub values: FieldValues,
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum NormalizeError {
    #[display("mapping for table {mapping_table} applied to table {table}")]
    TableMismatch { mapping_table: String, table: String },
    #[display("table {table}: column {column} is not present")]
    MissingColumn { table: String, column: String },
    #[display("table {table}: column {column} declares unit {unit}, incompatible with {field}")]
    IncompatibleUnit {
        table: String,
        column: String,
        field: Field,
        unit: Unit,
    },
    #[display("table {table}: field {field} is mapped from more than one column")]
    DuplicateFieldMapping { table: String, field: Field },
    #[display("table {table}, line {line}: unknown region {value:?}")]
    UnknownRegion {
        table: String,
        line: usize,
        value: String,
    },
    #[display("table {table}, line {line}: invalid date {value:?}")]
    InvalidDate {
        table: String,
        line: usize,
        value: String,
    },
    #[display("table {table}, line {line}: invalid {field} value {value:?}")]
    InvalidValue {
        table: String,
        line: usize,
        field: Field,
        value: String,
    },
    #[display("table {table}, line {line}: {field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        table: String,
        line: usize,
        field: Field,
        value: f64,
        min: f64,
        max: f64,
    },
}

struct ResolvedColumn {
    index: usize,
    field: Field,
    factor: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    aliases: RegionAliases,
}

impl Normalizer {
    #[must_use]
    pub fn new(aliases: RegionAliases) -> Self {
        Self { aliases }
    }

    /// Normalizes every row of `table`.
    ///
    /// Rows whose cells are all blank are skipped.
    ///
    /// # Examples
    ///
    /// ```
    /// use railpulse_dataset::{
    ///     normalize::Normalizer,
    ///     region::Region,
    ///     schema::Field,
    ///     source::{SourceMapping, SourceTable},
    /// };
    ///
    /// let table = SourceTable::from_csv_reader(
    ///     "ppm",
    ///     "day,area,ppm\n2024-01-01,North-West,0.9\n".as_bytes(),
    /// )
    /// .unwrap();
    /// let mapping: SourceMapping = serde_json::from_str(
    ///     r#"{"table":"ppm","date_column":"day","region_column":"area",
    ///         "columns":{"ppm":{"field":"punctuality_pct","unit":"fraction"}}}"#,
    /// )
    /// .unwrap();
    /// let rows = Normalizer::default().normalize(&table, &mapping).unwrap();
    /// assert_eq!(rows[0].key.region, Region::NorthWest);
    /// assert_eq!(rows[0].values.get(Field::PunctualityPct), Some(90.0));
    /// ```
    pub fn normalize(
        &self,
        table: &SourceTable,
        mapping: &SourceMapping,
    ) -> Result<Vec<NormalizedRow>, NormalizeError> {
        if mapping.table != table.id {
            return Err(NormalizeError::TableMismatch {
                mapping_table: mapping.table.clone(),
                table: table.id.clone(),
            });
        }
        let date_index = required_column(table, &mapping.date_column)?;
        let region_index = required_column(table, &mapping.region_column)?;
        let columns = resolve_columns(table, mapping)?;

        let mut rows = Vec::with_capacity(table.rows.len());
        for raw in &table.rows {
            if raw.cells.iter().all(|c| c.trim().is_empty()) {
                continue;
            }

            let region_cell = raw.cell(region_index);
            let region =
                self.aliases
                    .resolve(region_cell)
                    .ok_or_else(|| NormalizeError::UnknownRegion {
                        table: table.id.clone(),
                        line: raw.line,
                        value: region_cell.to_owned(),
                    })?;

            let date_cell = raw.cell(date_index).trim();
            let date = NaiveDate::parse_from_str(date_cell, &mapping.date_format).map_err(|_| {
                NormalizeError::InvalidDate {
                    table: table.id.clone(),
                    line: raw.line,
                    value: date_cell.to_owned(),
                }
            })?;

            let mut values = FieldValues::new();
            for column in &columns {
                let cell = raw.cell(column.index).trim();
                if cell.is_empty() {
                    continue;
                }
                let parsed = parse_number(cell).ok_or_else(|| NormalizeError::InvalidValue {
                    table: table.id.clone(),
                    line: raw.line,
                    field: column.field,
                    value: cell.to_owned(),
                })?;
                let value = parsed * column.factor;
                let spec = column.field.spec();
                if !spec.contains(value) {
                    return Err(NormalizeError::OutOfRange {
                        table: table.id.clone(),
                        line: raw.line,
                        field: column.field,
                        value,
                        min: spec.min,
                        max: spec.max,
                    });
                }
                values.set(column.field, value);
            }

            rows.push(NormalizedRow {
                table: table.id.clone(),
                line: raw.line,
                key: RecordKey { date, region },
                values,
            });
        }

        tracing::debug!(table = %table.id, rows = rows.len(), "normalized source table");
        Ok(rows)
    }
}

fn required_column(table: &SourceTable, name: &str) -> Result<usize, NormalizeError> {
    table
        .column_index(name)
        .ok_or_else(|| NormalizeError::MissingColumn {
            table: table.id.clone(),
            column: name.to_owned(),
        })
}

fn resolve_columns(
    table: &SourceTable,
    mapping: &SourceMapping,
) -> Result<Vec<ResolvedColumn>, NormalizeError> {
    let mut resolved: Vec<ResolvedColumn> = vec![];
    for (column, target) in &mapping.columns {
        let index = required_column(table, column)?;
        let canonical = target.field.spec().unit;
        let unit = target.unit.unwrap_or(canonical);
        let factor = unit
            .factor_to(canonical)
            .ok_or_else(|| NormalizeError::IncompatibleUnit {
                table: table.id.clone(),
                column: column.clone(),
                field: target.field,
                unit,
            })?;
        if resolved.iter().any(|c| c.field == target.field) {
            return Err(NormalizeError::DuplicateFieldMapping {
                table: table.id.clone(),
                field: target.field,
            });
        }
        resolved.push(ResolvedColumn {
            index,
            field: target.field,
            factor,
        });
    }
    Ok(resolved)
}

/// Parses a numeric cell, tolerating thousands separators and a trailing `%`.
fn parse_number(cell: &str) -> Option<f64> {
    let cleaned = cell
        .strip_suffix('%')
        .unwrap_or(cell)
        .trim()
        .replace(',', "");
    let value = cleaned.parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{region::Region, source::ColumnMapping};

    fn table(data: &str) -> SourceTable {
        SourceTable::from_csv_reader("ops", data.as_bytes()).unwrap()
    }

    fn mapping(columns: &[(&str, Field, Option<Unit>)]) -> SourceMapping {
        SourceMapping {
            table: "ops".to_owned(),
            date_column: "date".to_owned(),
            date_format: "%Y-%m-%d".to_owned(),
            region_column: "region".to_owned(),
            columns: columns
                .iter()
                .map(|(c, field, unit)| {
                    (
                        (*c).to_owned(),
                        ColumnMapping {
                            field: *field,
                            unit: *unit,
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_converts_units_and_keeps_blanks_null() {
        let t = table(
            "date,region,ppm,wind,late\n\
             2024-02-01,scotland,0.875,10,1.5\n\
             2024-02-02,Scotland,,,\n",
        );
        let m = mapping(&[
            ("ppm", Field::PunctualityPct, Some(Unit::Fraction)),
            ("wind", Field::WindSpeedKmh, Some(Unit::MilesPerHour)),
            ("late", Field::DelayMinutesWeather, Some(Unit::Hours)),
        ]);
        let rows = Normalizer::default().normalize(&t, &m).unwrap();
        assert_eq!(rows.len(), 2);
        let first = &rows[0];
        assert_eq!(first.line, 2);
        assert_eq!(first.key.region, Region::Scotland);
        assert!((first.values.get(Field::PunctualityPct).unwrap() - 87.5).abs() < 1e-9);
        assert!((first.values.get(Field::WindSpeedKmh).unwrap() - 16.093_44).abs() < 1e-9);
        assert!((first.values.get(Field::DelayMinutesWeather).unwrap() - 90.0).abs() < 1e-9);
        assert!(rows[1].values.is_empty());
    }

    #[test]
    fn test_unknown_region_names_line_and_value() {
        let t = table("date,region,ppm\n2024-02-01,London,90\n2024-02-01,Atlantis,90\n");
        let m = mapping(&[("ppm", Field::PunctualityPct, None)]);
        let err = Normalizer::default().normalize(&t, &m).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::UnknownRegion {
                table: "ops".to_owned(),
                line: 3,
                value: "Atlantis".to_owned(),
            }
        );
    }

    #[test]
    fn test_configured_alias_resolves() {
        let extra = BTreeMap::from([("Atlantis".to_owned(), Region::SouthWest)]);
        let normalizer = Normalizer::new(RegionAliases::with_extra(&extra));
        let t = table("date,region,ppm\n2024-02-01,ATLANTIS,90\n");
        let m = mapping(&[("ppm", Field::PunctualityPct, None)]);
        let rows = normalizer.normalize(&t, &m).unwrap();
        assert_eq!(rows[0].key.region, Region::SouthWest);
    }

    #[test]
    fn test_rejects_bad_cells() {
        let m = mapping(&[("ppm", Field::PunctualityPct, None)]);
        let normalizer = Normalizer::default();

        let err = normalizer
            .normalize(&table("date,region,ppm\n01/02/2024,Wales,90\n"), &m)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidDate { line: 2, .. }));

        let err = normalizer
            .normalize(&table("date,region,ppm\n2024-02-01,Wales,n/a\n"), &m)
            .unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::InvalidValue {
                field: Field::PunctualityPct,
                ..
            }
        ));

        let err = normalizer
            .normalize(&table("date,region,ppm\n2024-02-01,Wales,104\n"), &m)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::OutOfRange { line: 2, .. }));
    }

    #[test]
    fn test_rejects_bad_mappings() {
        let t = table("date,region,ppm,cancel\n2024-02-01,Wales,90,3\n");
        let normalizer = Normalizer::default();

        let err = normalizer
            .normalize(&t, &mapping(&[("missing", Field::PunctualityPct, None)]))
            .unwrap_err();
        assert!(matches!(err, NormalizeError::MissingColumn { .. }));

        let err = normalizer
            .normalize(
                &t,
                &mapping(&[("cancel", Field::Cancellations, Some(Unit::Percent))]),
            )
            .unwrap_err();
        assert!(matches!(err, NormalizeError::IncompatibleUnit { .. }));

        let err = normalizer
            .normalize(
                &t,
                &mapping(&[
                    ("ppm", Field::PunctualityPct, None),
                    ("cancel", Field::PunctualityPct, None),
                ]),
            )
            .unwrap_err();
        assert!(matches!(err, NormalizeError::DuplicateFieldMapping { .. }));
    }

    #[test]
    fn test_parse_number_tolerates_formatting() {
        assert_eq!(parse_number("1,234"), Some(1234.0));
        assert_eq!(parse_number("92.5%"), Some(92.5));
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("abc"), None);
    }
}
