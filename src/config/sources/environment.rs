//! Environment variable source: COLDSTASH__* prefix with __ separator

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Prefix of configuration overrides, e.g. `COLDSTASH__VAULT__NAME`.
pub const ENV_PREFIX: &str = "COLDSTASH";

/// Add environment variable overlay to builder.
/// Uses the COLDSTASH prefix and __ as separator for nested keys.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );
    Ok(builder)
}
