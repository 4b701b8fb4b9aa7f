//! MergeService: orchestrates sources, applies merge policy, deserializes to BackupConfig.

use crate::config::sources::{environment, explicit_file, global_file};
use crate::config::BackupConfig;
use config::ConfigError;
use std::path::Path;

use super::merge_policy;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config from standard sources.
    /// Precedence: defaults (lowest) -> global file -> explicit file -> environment (highest).
    pub fn load(explicit: Option<&Path>) -> Result<BackupConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = match explicit {
            Some(path) => explicit_file::add_to_builder(builder, path)?,
            None => builder,
        };
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load config from a specific file with environment overlay, skipping
    /// the global file.
    pub fn load_from_file(path: &Path) -> Result<BackupConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = explicit_file::add_to_builder(builder, path)?;
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        config.try_deserialize()
    }
}
