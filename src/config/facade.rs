//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::BackupConfig;
use crate::error::BackupError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from files and environment.
    pub fn load(explicit: Option<&Path>) -> Result<BackupConfig, BackupError> {
        let config = MergeService::load(explicit)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<BackupConfig, BackupError> {
        let config = MergeService::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Create default configuration.
    pub fn default() -> BackupConfig {
        BackupConfig::default()
    }
}
