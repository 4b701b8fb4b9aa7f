//! Upload sizing and retry policy.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

pub const MIB: u64 = 1024 * 1024;

/// Chunk size and worker count for one multipart upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Bytes per part
    pub chunk_size: u64,
    /// Parts uploaded concurrently
    pub workers: usize,
}

impl UploadSettings {
    pub fn new(chunk_size: u64, workers: usize) -> Self {
        Self {
            chunk_size,
            workers,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than zero".to_string());
        }
        if usize::try_from(self.chunk_size).is_err() {
            return Err(format!("chunk_size {} is too large", self.chunk_size));
        }
        if self.workers == 0 {
            return Err("workers must be at least 1".to_string());
        }
        Ok(())
    }

    /// Tree hashes of parts only combine into the archive tree hash when
    /// every part is a power-of-two number of MiB.
    pub fn is_tree_hash_aligned(&self) -> bool {
        self.chunk_size % MIB == 0 && (self.chunk_size / MIB).is_power_of_two()
    }
}

/// Settings applied to files strictly larger than `min_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTier {
    pub min_size: u64,
    pub chunk_size: u64,
    pub workers: usize,
}

impl UploadTier {
    pub fn settings(&self) -> UploadSettings {
        UploadSettings::new(self.chunk_size, self.workers)
    }
}

/// Size-tiered choice of upload settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
    /// Tiers checked in order; the first whose threshold the size exceeds wins
    #[serde(default = "default_tiers")]
    pub tiers: Vec<UploadTier>,
    /// Used when no tier matches
    #[serde(default = "default_base")]
    pub base: UploadSettings,
    /// Used when the file size cannot be determined
    #[serde(default = "default_fallback")]
    pub fallback: UploadSettings,
}

fn default_tiers() -> Vec<UploadTier> {
    vec![
        UploadTier {
            min_size: 128 * MIB,
            chunk_size: 32 * MIB,
            workers: 8,
        },
        UploadTier {
            min_size: 16 * MIB,
            chunk_size: 8 * MIB,
            workers: 4,
        },
    ]
}

fn default_base() -> UploadSettings {
    UploadSettings::new(8 * MIB, 2)
}

fn default_fallback() -> UploadSettings {
    UploadSettings::new(8 * MIB, 1)
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            base: default_base(),
            fallback: default_fallback(),
        }
    }
}

impl UploadPolicy {
    /// Settings for a payload of `size` bytes.
    pub fn for_size(&self, size: u64) -> UploadSettings {
        self.tiers
            .iter()
            .find(|tier| size > tier.min_size)
            .map(UploadTier::settings)
            .unwrap_or(self.base)
    }

    /// Settings for the file at `path`, or the fallback if its size is unknown.
    pub fn for_file(&self, path: &Path) -> UploadSettings {
        match std::fs::metadata(path) {
            Ok(metadata) => {
                let settings = self.for_size(metadata.len());
                debug!(
                    path = %path.display(),
                    size = metadata.len(),
                    chunk_size = settings.chunk_size,
                    workers = settings.workers,
                    "Selected upload settings"
                );
                settings
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unable to determine file size, using fallback upload settings");
                self.fallback
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for tier in &self.tiers {
            tier.settings()
                .validate()
                .map_err(|e| format!("tier above {} bytes: {}", tier.min_size, e))?;
        }
        if self.tiers.windows(2).any(|w| w[0].min_size <= w[1].min_size) {
            return Err("upload tiers must be ordered by descending min_size".to_string());
        }
        self.base.validate().map_err(|e| format!("base: {}", e))?;
        self.fallback
            .validate()
            .map_err(|e| format!("fallback: {}", e))?;
        Ok(())
    }
}

/// Per-part retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}
