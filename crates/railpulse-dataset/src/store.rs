//! Versioned, column-major persistence of master datasets.
//!
//! A dataset is written as one JSON document:
//!
//! ```text
//! {
//!   "schema_version": 1,
//!   "row_count": 2,
//!   "precedence": ["official"],
//!   "report": { ... },
//!   "dates": ["2024-01-01", "2024-01-01"],
//!   "regions": ["scotland", "wales"],
//!   "fields": [{ "field": "trains_planned", "values": [1200.0, null] }, ...]
//! }
//! ```
//!
//! Every field of the catalog is written in catalog order and the document carries no
//! timestamps, so identical datasets encode to identical bytes.
//!
//! Published versions are named `master-v{N:04}.json` and are never rewritten.

use std::{
    fs,
    io::{self, Write as _},
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{
    master::{BuildReport, MasterDataset, MasterRecord},
    region::Region,
    schema::{Field, FieldValues, RecordKey, SCHEMA_VERSION, SchemaViolation},
};

const FILE_PREFIX: &str = "master-v";
const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Serialize, Deserialize)]
struct FieldColumn {
    field: Field,
    values: Vec<Option<f64>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DatasetDocument {
    schema_version: u32,
    row_count: usize,
    precedence: Vec<String>,
    report: BuildReport,
    dates: Vec<NaiveDate>,
    regions: Vec<Region>,
    fields: Vec<FieldColumn>,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum DecodeError {
    #[display("malformed dataset document")]
    Json {
        #[error(source)]
        error: serde_json::Error,
    },
    #[display("dataset has schema version {found}, expected {expected}")]
    SchemaVersion { found: u32, expected: u32 },
    #[display("column {column} has {actual} values, expected {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[display("dataset row violates the schema")]
    Schema {
        #[error(source)]
        violation: SchemaViolation,
    },
}

/// Encodes `dataset` as a pretty-printed column-major JSON document.
pub fn encode(dataset: &MasterDataset) -> Result<Vec<u8>, serde_json::Error> {
    let records = dataset.records();
    let doc = DatasetDocument {
        schema_version: dataset.schema_version(),
        row_count: records.len(),
        precedence: dataset.precedence().to_vec(),
        report: dataset.report().clone(),
        dates: records.iter().map(|r| r.key.date).collect(),
        regions: records.iter().map(|r| r.key.region).collect(),
        fields: Field::ALL
            .into_iter()
            .map(|field| FieldColumn {
                field,
                values: dataset.column(field),
            })
            .collect(),
    };
    let mut bytes = serde_json::to_vec_pretty(&doc)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decodes a document written by [`encode`], re-validating every row.
pub fn decode(bytes: &[u8]) -> Result<MasterDataset, DecodeError> {
    let doc: DatasetDocument =
        serde_json::from_slice(bytes).map_err(|error| DecodeError::Json { error })?;
    if doc.schema_version != SCHEMA_VERSION {
        return Err(DecodeError::SchemaVersion {
            found: doc.schema_version,
            expected: SCHEMA_VERSION,
        });
    }
    let check_len = |column: &str, actual: usize| {
        if actual == doc.row_count {
            Ok(())
        } else {
            Err(DecodeError::ColumnLength {
                column: column.to_owned(),
                expected: doc.row_count,
                actual,
            })
        }
    };
    check_len("date", doc.dates.len())?;
    check_len("region", doc.regions.len())?;
    for column in &doc.fields {
        check_len(column.field.id(), column.values.len())?;
    }

    let mut records = doc
        .dates
        .iter()
        .zip(&doc.regions)
        .map(|(&date, &region)| MasterRecord {
            key: RecordKey { date, region },
            values: FieldValues::new(),
        })
        .collect::<Vec<_>>();
    for column in &doc.fields {
        for (record, value) in records.iter_mut().zip(&column.values) {
            if let Some(value) = value {
                record.values.set(column.field, *value);
            }
        }
    }
    MasterDataset::new(doc.precedence, records, doc.report)
        .map_err(|violation| DecodeError::Schema { violation })
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum StoreError {
    #[display("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[error(source)]
        error: io::Error,
    },
    #[display("failed to encode dataset for {}", path.display())]
    Encode {
        path: PathBuf,
        #[error(source)]
        error: serde_json::Error,
    },
    #[display("failed to decode {}", path.display())]
    Decode {
        path: PathBuf,
        #[error(source)]
        error: DecodeError,
    },
    #[display("version {version} already exists in {}", root.display())]
    VersionExists { root: PathBuf, version: u32 },
    #[display("no published dataset in {}", root.display())]
    NoVersions { root: PathBuf },
}

/// Writes `bytes` to a temp file next to `path` and renames it over `path`.
///
/// The temp file is removed if any step fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file = staged(path, bytes)?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Like [`write_atomic`], but fails with [`io::ErrorKind::AlreadyExists`] instead of
/// replacing an existing `path`.
pub fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file = staged(path, bytes)?;
    file.persist_noclobber(path).map_err(|e| e.error)?;
    Ok(())
}

fn staged(path: &Path, bytes: &[u8]) -> io::Result<NamedTempFile> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    Ok(file)
}

/// A directory of published master dataset versions.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    root: PathBuf,
}

impl DatasetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path_of(&self, version: u32) -> PathBuf {
        self.root.join(format!("{FILE_PREFIX}{version:04}{FILE_SUFFIX}"))
    }

    /// Published versions in ascending order. A missing root has no versions.
    pub fn versions(&self) -> Result<Vec<u32>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(error) => {
                return Err(StoreError::Io {
                    path: self.root.clone(),
                    error,
                });
            }
        };
        let mut versions = vec![];
        for entry in entries {
            let entry = entry.map_err(|error| StoreError::Io {
                path: self.root.clone(),
                error,
            })?;
            let name = entry.file_name();
            let Some(version) = name
                .to_str()
                .and_then(|n| n.strip_prefix(FILE_PREFIX))
                .and_then(|n| n.strip_suffix(FILE_SUFFIX))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            versions.push(version);
        }
        versions.sort_unstable();
        Ok(versions)
    }

    pub fn latest_version(&self) -> Result<Option<u32>, StoreError> {
        Ok(self.versions()?.last().copied())
    }

    /// Publishes `dataset` as the next version and returns that version.
    pub fn publish(&self, dataset: &MasterDataset) -> Result<u32, StoreError> {
        let version = self.latest_version()?.map_or(1, |v| v + 1);
        self.publish_as(dataset, version)?;
        Ok(version)
    }

    fn publish_as(&self, dataset: &MasterDataset, version: u32) -> Result<(), StoreError> {
        let path = self.path_of(version);
        let bytes = encode(dataset).map_err(|error| StoreError::Encode {
            path: path.clone(),
            error,
        })?;
        write_new(&path, &bytes).map_err(|error| match error.kind() {
            io::ErrorKind::AlreadyExists => StoreError::VersionExists {
                root: self.root.clone(),
                version,
            },
            _ => StoreError::Io {
                path: path.clone(),
                error,
            },
        })?;
        tracing::info!(version, path = %path.display(), records = dataset.len(), "published master dataset");
        Ok(())
    }

    pub fn load_version(&self, version: u32) -> Result<MasterDataset, StoreError> {
        let path = self.path_of(version);
        let bytes = fs::read(&path).map_err(|error| StoreError::Io {
            path: path.clone(),
            error,
        })?;
        decode(&bytes).map_err(|error| StoreError::Decode { path, error })
    }

    pub fn load_latest(&self) -> Result<(u32, MasterDataset), StoreError> {
        let version = self
            .latest_version()?
            .ok_or_else(|| StoreError::NoVersions {
                root: self.root.clone(),
            })?;
        Ok((version, self.load_version(version)?))
    }
}
