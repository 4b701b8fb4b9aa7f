//! XDG Base Directory locations for coldstash.

use crate::error::BackupError;
use std::path::PathBuf;

const APP_DIR: &str = "coldstash";

/// Get XDG data home directory
///
/// Returns `$XDG_DATA_HOME` if set, otherwise defaults to `$HOME/.local/share`
pub fn data_home() -> Result<PathBuf, BackupError> {
    if let Ok(xdg_data_home) = std::env::var("XDG_DATA_HOME") {
        return Ok(PathBuf::from(xdg_data_home));
    }

    let home = std::env::var("HOME").map_err(|_| {
        BackupError::ConfigError(
            "Could not determine XDG data home directory (HOME not set)".to_string(),
        )
    })?;
    Ok(PathBuf::from(home).join(".local").join("share"))
}

/// Get XDG config home directory
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise defaults to `$HOME/.config`
pub fn config_home() -> Result<PathBuf, BackupError> {
    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg_config_home));
    }

    let home = std::env::var("HOME").map_err(|_| {
        BackupError::ConfigError(
            "Could not determine XDG config home directory (HOME not set)".to_string(),
        )
    })?;

    Ok(PathBuf::from(home).join(".config"))
}

/// `$XDG_CONFIG_HOME/coldstash/config.toml`
pub fn global_config_path() -> Result<PathBuf, BackupError> {
    Ok(config_home()?.join(APP_DIR).join("config.toml"))
}

/// Default root of the local vault: `$XDG_DATA_HOME/coldstash/vaults`
pub fn default_vault_root() -> Result<PathBuf, BackupError> {
    Ok(data_home()?.join(APP_DIR).join("vaults"))
}
