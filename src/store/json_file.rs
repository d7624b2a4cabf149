//! JSON file registry store.
//!
//! The document records the registry fingerprint next to the routes; a
//! mismatch on load means the file was edited or truncated and is refused.
//! Saves go to a sibling temp file first and are renamed into place.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::RegistryStore;
use crate::registry::SelectorRegistry;
use crate::REGISTRY_SCHEMA_VERSION;

/// Error type for the JSON file store.
#[derive(Debug, thiserror::Error)]
pub enum JsonStoreError {
    /// Filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Malformed document.
    #[error("Malformed registry document: {0}")]
    Json(#[from] serde_json::Error),
    /// Stored fingerprint does not match the stored routes.
    #[error("Registry document fingerprint mismatch: stored {stored}, computed {computed}")]
    FingerprintMismatch {
        /// Fingerprint written in the document.
        stored: String,
        /// Fingerprint of the routes actually present.
        computed: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryDocument {
    schema_version: String,
    fingerprint: String,
    saved_at: DateTime<Utc>,
    routes: SelectorRegistry,
}

/// Registry persisted as a JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileRegistryStore {
    path: PathBuf,
}

impl JsonFileRegistryStore {
    /// Store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time and length of the backing file; `None` if it
    /// does not exist yet. Changes whenever another process saves.
    pub async fn file_stamp(&self) -> Result<Option<(SystemTime, u64)>, JsonStoreError> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(&self.path, e)),
        };
        let modified = metadata
            .modified()
            .map_err(|e| self.io_error(&self.path, e))?;
        Ok(Some((modified, metadata.len())))
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> JsonStoreError {
        JsonStoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl RegistryStore for JsonFileRegistryStore {
    type Error = JsonStoreError;

    async fn load(&self) -> Result<SelectorRegistry, Self::Error> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no registry file yet, starting empty");
                return Ok(SelectorRegistry::new());
            }
            Err(e) => return Err(self.io_error(&self.path, e)),
        };

        let document: RegistryDocument = serde_json::from_slice(&bytes)?;
        let computed = document.routes.fingerprint();
        if computed != document.fingerprint {
            return Err(JsonStoreError::FingerprintMismatch {
                stored: document.fingerprint,
                computed,
            });
        }

        debug!(
            path = %self.path.display(),
            selectors = document.routes.len(),
            fingerprint = %computed,
            "registry loaded"
        );
        Ok(document.routes)
    }

    async fn save(&self, registry: &SelectorRegistry) -> Result<(), Self::Error> {
        let document = RegistryDocument {
            schema_version: REGISTRY_SCHEMA_VERSION.to_string(),
            fingerprint: registry.fingerprint(),
            saved_at: Utc::now(),
            routes: registry.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(parent, e))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(|e| self.io_error(&temp, e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.io_error(&self.path, e))?;

        debug!(
            path = %self.path.display(),
            selectors = registry.len(),
            fingerprint = %document.fingerprint,
            "registry saved"
        );
        Ok(())
    }
}
