//! Versioned on-disk store of model artifacts.
//!
//! Artifacts are JSON files named `{family}-{hash prefix}-v{N:03}.json`. Each publish
//! allocates the next version for that family and schema and is written through a
//! temporary file that is moved into place only if that version is still free.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use railpulse_dataset::store::write_new;

use crate::model::{ModelFamily, TrainedModel, model_key};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ModelStoreError {
    #[display("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[error(source)]
        error: io::Error,
    },
    #[display("failed to encode or decode model artifact {}", path.display())]
    Json {
        path: PathBuf,
        #[error(source)]
        error: serde_json::Error,
    },
    #[display(
        "model artifact {} records schema hash {recorded} but its schema hashes to {computed}",
        path.display()
    )]
    HashMismatch {
        path: PathBuf,
        recorded: String,
        computed: String,
    },
    #[display("model artifact {} already exists", path.display())]
    VersionExists { path: PathBuf },
    #[display("no stored model {key} under {}", root.display())]
    NotFound { root: PathBuf, key: String },
}

#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path_of(&self, key: &str, version: u32) -> PathBuf {
        self.root.join(format!("{key}-v{version:03}.json"))
    }

    /// Published versions of `key` in ascending order.
    pub fn versions(&self, key: &str) -> Result<Vec<u32>, ModelStoreError> {
        let io_error = |error: io::Error| ModelStoreError::Io {
            path: self.root.clone(),
            error,
        };
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(io_error(e)),
        };
        let prefix = format!("{key}-v");
        let mut versions = vec![];
        for entry in entries {
            let name = entry.map_err(io_error)?.file_name();
            let Some(version) = name
                .to_str()
                .and_then(|n| n.strip_prefix(&prefix))
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            versions.push(version);
        }
        versions.sort_unstable();
        Ok(versions)
    }

    /// Writes `model` as the next version of its key and returns the artifact path.
    pub fn publish(&self, model: &TrainedModel) -> Result<PathBuf, ModelStoreError> {
        let key = model.key();
        let version = self.versions(&key)?.last().map_or(1, |v| v + 1);
        let path = self.path_of(&key, version);
        let mut bytes = serde_json::to_vec_pretty(model).map_err(|error| ModelStoreError::Json {
            path: path.clone(),
            error,
        })?;
        bytes.push(b'\n');
        write_new(&path, &bytes).map_err(|error| match error.kind() {
            io::ErrorKind::AlreadyExists => ModelStoreError::VersionExists { path: path.clone() },
            _ => ModelStoreError::Io {
                path: path.clone(),
                error,
            },
        })?;
        tracing::info!(
            family = %model.family(),
            version,
            path = %path.display(),
            status = ?model.status(),
            "published model artifact"
        );
        Ok(path)
    }

    /// Reads an artifact and checks its recorded schema hash against its schema.
    pub fn load(&self, path: &Path) -> Result<TrainedModel, ModelStoreError> {
        let bytes = fs::read(path).map_err(|error| ModelStoreError::Io {
            path: path.to_owned(),
            error,
        })?;
        let model: TrainedModel =
            serde_json::from_slice(&bytes).map_err(|error| ModelStoreError::Json {
                path: path.to_owned(),
                error,
            })?;
        let computed = model.schema().hash();
        if computed != model.schema_hash() {
            return Err(ModelStoreError::HashMismatch {
                path: path.to_owned(),
                recorded: model.schema_hash().to_owned(),
                computed,
            });
        }
        Ok(model)
    }

    /// Loads the newest artifact of `family` trained against `schema_hash`.
    pub fn load_latest(
        &self,
        family: ModelFamily,
        schema_hash: &str,
    ) -> Result<(u32, TrainedModel), ModelStoreError> {
        let key = model_key(family, schema_hash);
        let version = self
            .versions(&key)?
            .last()
            .copied()
            .ok_or_else(|| ModelStoreError::NotFound {
                root: self.root.clone(),
                key: key.clone(),
            })?;
        let model = self.load(&self.path_of(&key, version))?;
        Ok((version, model))
    }
}
