//! Service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::error::{PixdexError, Result};
use crate::ingest::DEFAULT_EMBED_BATCH_SIZE;
use crate::storage::StorageConfig;

/// Configuration for a [`SearchService`](crate::service::SearchService).
///
/// Missing fields in a JSON file fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixdexConfig {
    /// Root directory of the index artifacts.
    pub index_dir: PathBuf,
    /// Embedding dimension of this deployment.
    pub dimension: usize,
    /// Number of decoded indexes kept in memory.
    pub cache_capacity: usize,
    /// Images per embedding provider call.
    pub embed_batch_size: usize,
    /// Deadline for one embedding step, in milliseconds. `None` waits forever.
    pub embed_timeout_ms: Option<u64>,
    /// Result count used when a caller does not pick one.
    pub default_top_k: usize,
    /// Attempts before a failed scope deletion is abandoned.
    pub max_delete_retries: u32,
    /// Attempts before a failed ingest is abandoned.
    pub max_ingest_retries: u32,
    /// Whether index writes are fsynced before they are committed.
    pub sync_writes: bool,
}

impl Default for PixdexConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("data/indexes"),
            dimension: 512,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            embed_timeout_ms: None,
            default_top_k: 5,
            max_delete_retries: 5,
            max_ingest_retries: 5,
            sync_writes: true,
        }
    }
}

impl PixdexConfig {
    /// Load a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PixdexError::invalid_config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(PixdexError::invalid_config("dimension must be positive"));
        }
        if self.cache_capacity == 0 {
            return Err(PixdexError::invalid_config("cache_capacity must be positive"));
        }
        if self.embed_batch_size == 0 {
            return Err(PixdexError::invalid_config(
                "embed_batch_size must be positive",
            ));
        }
        Ok(())
    }

    pub fn embed_timeout(&self) -> Option<Duration> {
        self.embed_timeout_ms.map(Duration::from_millis)
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            sync_writes: self.sync_writes,
            ..StorageConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = PixdexConfig::default();
        assert_eq!(config.dimension, 512);
        assert_eq!(config.cache_capacity, 50);
        assert_eq!(config.embed_batch_size, 32);
        assert_eq!(config.default_top_k, 5);
        assert_eq!(config.max_delete_retries, 5);
        assert_eq!(config.max_ingest_retries, 5);
        assert!(config.embed_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_with_partial_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pixdex.json");
        std::fs::write(&path, r#"{"dimension": 8, "embed_timeout_ms": 1500}"#).unwrap();

        let config = PixdexConfig::from_file(&path).unwrap();
        assert_eq!(config.dimension, 8);
        assert_eq!(config.cache_capacity, 50);
        assert_eq!(config.embed_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_invalid_values() {
        let config = PixdexConfig {
            dimension: 0,
            ..PixdexConfig::default()
        };
        assert!(matches!(config.validate(), Err(PixdexError::InvalidConfig(_))));

        let config = PixdexConfig {
            embed_batch_size: 0,
            ..PixdexConfig::default()
        };
        assert!(config.validate().is_err());

        assert!(PixdexConfig::from_file("/nonexistent/pixdex.json").is_err());
    }
}
