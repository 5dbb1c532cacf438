//! Cache persistence
//!
//! The cache survives restarts as a JSON array of `CacheRecord`s. A missing
//! file means an empty cache. Writes go to a temp file that is then renamed
//! over the target so readers never see a partial file.

use super::CacheRecord;
use hmx_common::{Error, Result};
use std::path::{Path, PathBuf};

/// JSON file backing for the analysis cache
#[derive(Debug, Clone)]
pub struct CachePersistence {
    path: PathBuf,
}

impl CachePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read persisted records; an absent file yields no records
    ///
    /// Expired records are returned as-is; `CacheStore::restore` discards them.
    pub async fn load(&self) -> Result<Vec<CacheRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No persisted cache found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse cache file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Replace the persisted cache with `records`
    pub async fn save(&self, records: &[CacheRecord]) -> Result<()> {
        let json = serde_json::to_vec(records)
            .map_err(|e| Error::Internal(format!("Failed to serialize cache: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        tracing::debug!(
            path = %self.path.display(),
            entries = records.len(),
            "Cache flushed to disk"
        );
        Ok(())
    }
}
