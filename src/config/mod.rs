//! Configuration
//!
//! `BackupConfig` is built once at startup by [`ConfigLoader`] from layered
//! sources (defaults, global file, explicit file, environment) and passed by
//! reference from there on.

pub mod facade;
pub mod merge;
pub mod paths;
pub mod sources;

pub use facade::ConfigLoader;

use crate::error::BackupError;
use crate::logging::{self, LoggingConfig};
use crate::upload::{RetryPolicy, UploadPolicy, UploadSettings, UploadTier};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default)]
    pub vault: VaultConfig,

    /// Where fingerprint stores and run indexes are kept; None keeps them
    /// beside the data
    #[serde(default)]
    pub metadata_dir: Option<PathBuf>,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Target vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default = "default_vault_name")]
    pub name: String,

    /// Root directory of the local vault; None uses the XDG data directory
    #[serde(default)]
    pub root: Option<PathBuf>,
}

fn default_vault_name() -> String {
    "default".to_string()
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            name: default_vault_name(),
            root: None,
        }
    }
}

impl VaultConfig {
    /// Configured root, or `$XDG_DATA_HOME/coldstash/vaults`.
    pub fn resolved_root(&self) -> Result<PathBuf, BackupError> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => paths::xdg_root::default_vault_root(),
        }
    }
}

/// Upload sizing, retry and wait settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Size tiers, largest threshold first
    #[serde(default = "default_tiers")]
    pub tiers: Vec<UploadTier>,

    /// Settings for payloads below every tier
    #[serde(default = "default_base")]
    pub base: UploadSettings,

    /// Settings when the payload size cannot be read
    #[serde(default = "default_fallback")]
    pub fallback: UploadSettings,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_wait_initial_ms")]
    pub wait_initial_ms: u64,

    #[serde(default = "default_wait_max_ms")]
    pub wait_max_ms: u64,
}

fn default_tiers() -> Vec<UploadTier> {
    UploadPolicy::default().tiers
}

fn default_base() -> UploadSettings {
    UploadPolicy::default().base
}

fn default_fallback() -> UploadSettings {
    UploadPolicy::default().fallback
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_wait_initial_ms() -> u64 {
    500
}

fn default_wait_max_ms() -> u64 {
    10_000
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            base: default_base(),
            fallback: default_fallback(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            wait_initial_ms: default_wait_initial_ms(),
            wait_max_ms: default_wait_max_ms(),
        }
    }
}

impl UploadConfig {
    pub fn policy(&self) -> UploadPolicy {
        UploadPolicy {
            tiers: self.tiers.clone(),
            base: self.base,
            fallback: self.fallback,
        }
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn wait_initial(&self) -> Duration {
        Duration::from_millis(self.wait_initial_ms)
    }

    pub fn wait_max(&self) -> Duration {
        Duration::from_millis(self.wait_max_ms)
    }
}

impl BackupConfig {
    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), BackupError> {
        let name = &self.vault.name;
        if name.trim().is_empty() || name.contains(['/', '\\']) {
            return Err(BackupError::ConfigError(format!(
                "Invalid vault name '{}'",
                name
            )));
        }

        self.upload
            .policy()
            .validate()
            .map_err(|e| BackupError::ConfigError(format!("Invalid upload policy: {}", e)))?;
        if self.upload.retry_attempts == 0 {
            return Err(BackupError::ConfigError(
                "upload.retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.upload.wait_initial_ms == 0 || self.upload.wait_max_ms < self.upload.wait_initial_ms {
            return Err(BackupError::ConfigError(
                "upload.wait_initial_ms must be non-zero and not above upload.wait_max_ms"
                    .to_string(),
            ));
        }

        logging::validate_format(&self.logging.format)?;
        logging::validate_output(&self.logging.output)?;
        Ok(())
    }

    /// Render as TOML, the format config files are read in.
    pub fn to_toml(&self) -> Result<String, BackupError> {
        toml::to_string_pretty(self)
            .map_err(|e| BackupError::ConfigError(format!("Failed to render config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::merge::service::MergeService;
    use crate::upload::MIB;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = BackupConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.vault.name, "default");
        assert_eq!(config.upload.retry(), RetryPolicy::default());
        assert_eq!(config.upload.policy(), UploadPolicy::default());
        assert_eq!(config.upload.wait_initial(), Duration::from_millis(500));
        assert_eq!(config.upload.wait_max(), Duration::from_secs(10));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
metadata_dir = "/var/lib/coldstash"

[vault]
name = "photos"
root = "/srv/vaults"

[upload]
retry_delay_ms = 250

[[upload.tiers]]
min_size = 1048576
chunk_size = 2097152
workers = 3

[logging]
level = "debug"
"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.vault.name, "photos");
        assert_eq!(config.vault.resolved_root().unwrap(), PathBuf::from("/srv/vaults"));
        assert_eq!(config.metadata_dir, Some(PathBuf::from("/var/lib/coldstash")));
        assert_eq!(config.upload.retry().delay, Duration::from_millis(250));
        assert_eq!(config.upload.retry().max_attempts, 3);
        assert_eq!(
            config.upload.policy().for_size(2 * MIB),
            UploadSettings::new(2 * MIB, 3)
        );
        assert_eq!(config.upload.base, UploadSettings::new(8 * MIB, 2));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.output, "stderr");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        assert!(MergeService::load(Some(&temp.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_environment_overrides_file() {
        // Key is unique to this test; other tests load config concurrently.
        const VAR: &str = "COLDSTASH__LOGGING__MODULES__COLDSTASH_ENVTEST";
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[logging.modules]\ncoldstash_envtest = \"warn\"\n").unwrap();

        std::env::set_var(VAR, "trace");
        let result = ConfigLoader::load_from_file(&path);
        std::env::remove_var(VAR);

        let config = result.unwrap();
        assert_eq!(
            config.logging.modules.get("coldstash_envtest").map(String::as_str),
            Some("trace")
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = BackupConfig::default();
        config.vault.name = String::new();
        assert!(config.validate().is_err());

        let mut config = BackupConfig::default();
        config.upload.retry_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = BackupConfig::default();
        config.upload.base = UploadSettings::new(0, 2);
        assert!(config.validate().is_err());

        let mut config = BackupConfig::default();
        config.upload.wait_max_ms = 10;
        assert!(config.validate().is_err());

        let mut config = BackupConfig::default();
        config.logging.output = "syslog".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut config = BackupConfig::default();
        config.vault.name = "archive".to_string();
        config.metadata_dir = Some(PathBuf::from("/meta"));

        let rendered = config.to_toml().unwrap();
        let parsed: BackupConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
