//! Raw source tables and the mappings that describe how to read them.

use std::{collections::BTreeMap, io, path::Path};

use serde::{Deserialize, Serialize};

use crate::schema::{Field, Unit};

/// One data row of a source table, as read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTableRow {
    /// 1-based line number in the source file (the header is line 1).
    pub line: usize,
    pub cells: Vec<String>,
}

/// A source table: a header and untyped rows.
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub id: String,
    pub columns: Vec<String>,
    pub rows: Vec<RawTableRow>,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum SourceError {
    #[display("failed to open table {table}")]
    Open {
        table: String,
        #[error(source)]
        error: io::Error,
    },
    #[display("failed to read table {table}")]
    Csv {
        table: String,
        #[error(source)]
        error: csv::Error,
    },
}

impl SourceTable {
    /// Reads a CSV file; the table id is the file stem.
    pub fn from_csv_path(path: &Path) -> Result<Self, SourceError> {
        let id = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
        let file = std::fs::File::open(path).map_err(|error| SourceError::Open {
            table: id.clone(),
            error,
        })?;
        Self::from_csv_reader(id, io::BufReader::new(file))
    }

    /// Reads CSV data with a header row from `reader`.
    ///
    /// Rows may have fewer cells than the header (missing cells are blank).
    ///
    /// # Examples
    ///
    /// ```
    /// use railpulse_dataset::source::SourceTable;
    ///
    /// let data = "date,region,ppm\n2024-01-01,London,91.2\n";
    /// let table = SourceTable::from_csv_reader("ppm", data.as_bytes()).unwrap();
    /// assert_eq!(table.columns, ["date", "region", "ppm"]);
    /// assert_eq!(table.rows[0].line, 2);
    /// ```
    pub fn from_csv_reader<R>(id: impl Into<String>, reader: R) -> Result<Self, SourceError>
    where
        R: io::Read,
    {
        let id = id.into();
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let columns = reader
            .headers()
            .map_err(|error| SourceError::Csv {
                table: id.clone(),
                error,
            })?
            .iter()
            .map(str::to_owned)
            .collect::<Vec<_>>();

        let mut rows = vec![];
        for record in reader.records() {
            let record = record.map_err(|error| SourceError::Csv {
                table: id.clone(),
                error,
            })?;
            let line = record
                .position()
                .map_or(rows.len() + 2, |p| usize::try_from(p.line()).unwrap_or(usize::MAX));
            rows.push(RawTableRow {
                line,
                cells: record.iter().map(str::to_owned).collect(),
            });
        }
        Ok(Self { id, columns, rows })
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

impl RawTableRow {
    /// The cell at `index`, or `""` if the row is short.
    #[must_use]
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map_or("", String::as_str)
    }
}

/// Where a column's values go and which unit the source uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub field: Field,
    /// Declared source unit; defaults to the field's canonical unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_owned()
}

/// How to read one source table.
///
/// # Examples
///
/// ```
/// use railpulse_dataset::source::SourceMapping;
///
/// let json = r#"{
///     "table": "weather",
///     "date_column": "day",
///     "region_column": "area",
///     "columns": { "wind_mph": { "field": "wind_speed_kmh", "unit": "miles_per_hour" } }
/// }"#;
/// let mapping: SourceMapping = serde_json::from_str(json).unwrap();
/// assert_eq!(mapping.date_format, "%Y-%m-%d");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMapping {
    pub table: String,
    pub date_column: String,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    pub region_column: String,
    pub columns: BTreeMap<String, ColumnMapping>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_header_and_line_numbers() {
        let data = "date,region,punctuality\n2024-01-01,Wales,90\n2024-01-02,Wales\n";
        let table = SourceTable::from_csv_reader("t", data.as_bytes()).unwrap();
        assert_eq!(table.columns, ["date", "region", "punctuality"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].line, 2);
        assert_eq!(table.rows[1].line, 3);
        assert_eq!(table.rows[1].cell(2), "");
        assert_eq!(table.column_index("region"), Some(1));
    }

    #[test]
    fn test_reads_file_and_uses_stem_as_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.csv");
        std::fs::write(&path, "date,region,rain\n2024-01-01,Wales,2.5\n").unwrap();
        let table = SourceTable::from_csv_path(&path).unwrap();
        assert_eq!(table.id, "weather");
        assert_eq!(table.rows[0].cells, ["2024-01-01", "Wales", "2.5"]);
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SourceTable::from_csv_path(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, SourceError::Open { .. }));
    }
}
