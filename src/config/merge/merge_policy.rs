//! Base layer for every config composition.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with scalar defaults. Nested tables left out here fall
/// back to the serde defaults on `BackupConfig`.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("vault.name", "default")?
        .set_default("upload.retry_attempts", 3)?
        .set_default("upload.retry_delay_ms", 5_000)?
        .set_default("upload.wait_initial_ms", 500)?
        .set_default("upload.wait_max_ms", 10_000)
}
