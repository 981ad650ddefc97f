//! File system sink state store
//!
//! Stores each state at `{base}/{catalogSlug}/{packageSlug}/{packageMajorVersion}.json`.
//! Writes go to a temporary file first and are renamed into place, so a crash never
//! leaves a truncated state behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use super::{SinkStateStore, StateError, StateResult};
use crate::models::{SinkState, SinkStateKey};

/// File system sink state store
#[derive(Debug, Clone)]
pub struct FileSinkStateStore {
    base_path: PathBuf,
}

impl FileSinkStateStore {
    /// Create a store rooted at `base_path`
    ///
    /// # Example
    ///
    /// ```rust
    /// use data_discovery_sdk::state::FileSinkStateStore;
    ///
    /// let store = FileSinkStateStore::new("/var/lib/discovery/state");
    /// ```
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Path of the document for a key
    ///
    /// Slugs must be single path segments; separators and `..` are rejected.
    pub fn path_for(&self, key: &SinkStateKey) -> StateResult<PathBuf> {
        for segment in [&key.catalog_slug, &key.package_slug] {
            if segment.is_empty()
                || segment == "."
                || segment.contains("..")
                || segment.contains(['/', '\\'])
            {
                return Err(StateError::InvalidKey(segment.clone()));
            }
        }

        Ok(self
            .base_path
            .join(&key.catalog_slug)
            .join(&key.package_slug)
            .join(format!("{}.json", key.package_major_version)))
    }
}

#[async_trait]
impl SinkStateStore for FileSinkStateStore {
    async fn load(&self, key: &SinkStateKey) -> StateResult<Option<SinkState>> {
        let path = self.path_for(key)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No saved sink state");
                return Ok(None);
            }
            Err(e) => return Err(StateError::io(path, e)),
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Saved sink state is not readable");
                Err(e.into())
            }
        }
    }

    async fn save(&self, key: &SinkStateKey, state: &SinkState) -> StateResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StateError::io(parent, e))?;
        }

        let json = serde_json::to_vec_pretty(state)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| StateError::io(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StateError::io(&path, e))?;

        debug!(path = %path.display(), key = %key, "Saved sink state");
        Ok(())
    }
}
