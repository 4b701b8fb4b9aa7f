//! Explicit config file source (`--config`). The file must exist.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};
use std::path::Path;

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }
    Ok(builder.add_source(
        File::from(path)
            .format(FileFormat::Toml)
            .required(true),
    ))
}
