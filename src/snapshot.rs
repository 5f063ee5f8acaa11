//! Flat JSON snapshot files under the data directory.
//!
//! Every file holds a single JSON array. Readers treat an empty file as an
//! empty array; writers replace the file through a temporary sibling and a
//! rename so readers never observe a half-written snapshot.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

pub const AIR_FILE: &str = "aqx.json";
pub const WEATHER_FILE: &str = "weather.json";
pub const REGISTRATION_FILE: &str = "registration.json";
pub const TOWN_FILE: &str = "town.json";
pub const TOWN_SITE_FILE: &str = "pm-site.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Error while reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Error while writing {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    data_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Read the file as an untyped JSON document.
    pub async fn read_value(&self, name: &str) -> Result<serde_json::Value, StoreError> {
        let path = self.path_of(name);
        let content = read_to_string(&path).await?;
        if content.trim().is_empty() {
            return Ok(serde_json::Value::Array(Vec::new()));
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Json { path, source })
    }

    #[instrument(skip(self))]
    pub async fn read_all<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, StoreError> {
        let path = self.path_of(name);
        let content = read_to_string(&path).await?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<T> =
            serde_json::from_str(&content).map_err(|source| StoreError::Json { path, source })?;
        debug!(rows = rows.len(), "loaded snapshot");
        Ok(rows)
    }

    /// Replace the snapshot wholesale.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn write_all<T: Serialize>(&self, name: &str, rows: &[T]) -> Result<(), StoreError> {
        let path = self.path_of(name);
        let body = serde_json::to_vec_pretty(rows).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Write {
                    path: path.clone(),
                    source,
                })?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|source| StoreError::Write {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Write { path, source })?;
        Ok(())
    }

    /// Read-modify-write append. A missing file starts a new array.
    pub async fn append<T: Serialize + DeserializeOwned>(
        &self,
        name: &str,
        row: T,
    ) -> Result<(), StoreError> {
        let mut rows: Vec<T> = match self.read_all(name).await {
            Ok(rows) => rows,
            Err(StoreError::Read { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        rows.push(row);
        self.write_all(name, &rows).await
    }
}

async fn read_to_string(path: &Path) -> Result<String, StoreError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })
}
