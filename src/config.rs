//! Construction-time configuration for an indexed region file.

use serde::{Deserialize, Serialize};

use crate::error::{RegionError, RegionResult};

pub const DEFAULT_BLOB_COUNT: u32 = 1024;
pub const DEFAULT_SEGMENT_SIZE: u32 = 4096;
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Settings consulted when a region file is *created*. Once a file exists,
/// `blob_count`/`segment_size` are immutable (§3) and any mismatch between a
/// supplied config and the on-disk header is a warning, not a fatal error —
/// the on-disk values always win.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub blob_count: u32,
    pub segment_size: u32,
    pub compression_level: i32,
    pub flush_on_write: bool,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            blob_count: DEFAULT_BLOB_COUNT,
            segment_size: DEFAULT_SEGMENT_SIZE,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            flush_on_write: false,
        }
    }
}

impl RegionConfig {
    pub fn validate(&self) -> RegionResult<()> {
        if self.blob_count == 0 {
            return Err(RegionError::InvalidConfig("blob_count must be > 0".into()));
        }
        if self.segment_size == 0 {
            return Err(RegionError::InvalidConfig("segment_size must be > 0".into()));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(RegionError::InvalidConfig(format!(
                "compression_level must be in [1, 22], got {}",
                self.compression_level
            )));
        }
        Ok(())
    }
}
