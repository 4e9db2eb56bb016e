//! Segment configuration

use crate::core::offset::Offset;
use crate::error::{Error, Result};
use crate::index::IndexPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default appender write buffer (128KB)
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 128 * 1024;

/// Default batch cache budget (8MB)
pub const DEFAULT_CACHE_MAX_BYTES: usize = 8 * 1024 * 1024;

/// Segment log file suffix
pub const LOG_SUFFIX: &str = "log";

/// Offset index file suffix
pub const INDEX_SUFFIX: &str = "index";

/// Batch cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Memory budget for cached batches, in serialized bytes
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_CACHE_MAX_BYTES,
        }
    }
}

/// Per-segment tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Bytes buffered by the appender before they are written to the file
    pub write_buffer_size: usize,
    /// Offset index sampling cadence
    pub index: IndexPolicy,
    /// Batch cache settings; `None` disables caching
    pub cache: Option<CacheConfig>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            index: IndexPolicy::default(),
            cache: Some(CacheConfig::default()),
        }
    }
}

impl SegmentConfig {
    /// Load a configuration from a JSON file, filling unset fields with defaults
    pub async fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration without a batch cache
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.write_buffer_size == 0 {
            return Err(Error::Configuration(
                "write_buffer_size must be positive".to_string(),
            ));
        }
        if let Some(cache) = &self.cache {
            if cache.max_bytes == 0 {
                return Err(Error::Configuration(
                    "cache.max_bytes must be positive (omit `cache` to disable it)".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Path of the log file of the segment starting at `base_offset`
pub fn log_path(dir: &Path, base_offset: Offset) -> PathBuf {
    dir.join(format!("{:020}.{LOG_SUFFIX}", base_offset.value()))
}

/// Path of the offset index of the segment starting at `base_offset`
pub fn index_path(dir: &Path, base_offset: Offset) -> PathBuf {
    dir.join(format!("{:020}.{INDEX_SUFFIX}", base_offset.value()))
}
