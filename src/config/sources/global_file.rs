//! Global config file source: `$XDG_CONFIG_HOME/coldstash/config.toml`

use crate::config::paths::xdg_root;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};
use tracing::debug;

/// Add the global config file, if one can be located. The file is optional.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    match xdg_root::global_config_path() {
        Ok(path) => {
            debug!(path = %path.display(), "Global config source");
            Ok(builder.add_source(File::from(path).format(FileFormat::Toml).required(false)))
        }
        Err(_) => Ok(builder),
    }
}
