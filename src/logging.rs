//! Logging System
//!
//! Structured logging through `tracing`. Level, format and destination come
//! from the `[logging]` config section, overridable per run with the
//! `COLDSTASH_LOG*` environment variables.

use crate::error::BackupError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Resolve the log file path with precedence: CLI, COLDSTASH_LOG_FILE env, config file, default.
pub fn resolve_log_file_path(
    cli_file: Option<PathBuf>,
    config_file: Option<PathBuf>,
) -> Result<PathBuf, BackupError> {
    if let Some(p) = cli_file {
        if !p.as_os_str().is_empty() {
            return Ok(p);
        }
    }
    if let Ok(env_path) = std::env::var("COLDSTASH_LOG_FILE") {
        if !env_path.is_empty() {
            return Ok(PathBuf::from(env_path));
        }
    }
    if let Some(p) = config_file {
        if !p.as_os_str().is_empty() {
            return Ok(p);
        }
    }
    default_log_file_path()
}

fn default_log_file_path() -> Result<PathBuf, BackupError> {
    let project_dirs = directories::ProjectDirs::from("", "coldstash", "coldstash").ok_or_else(|| {
        BackupError::ConfigError(
            "Could not determine platform state directory for log file".to_string(),
        )
    })?;
    // macOS and Windows have no state dir; fall back to the data dir there.
    let dir = project_dirs
        .state_dir()
        .unwrap_or_else(|| project_dirs.data_local_dir());
    Ok(dir.join("coldstash.log"))
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Whether logging is enabled (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file, file+stderr, both
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path when output includes file; None means use runtime default
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Enable colored output (text format only, stdout/stderr only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: None,
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

/// Initialize the logging system
///
/// Priority order (highest to lowest):
/// 1. CLI arguments (applied to the config before this call)
/// 2. Environment variables (COLDSTASH_LOG, COLDSTASH_LOG_FORMAT, etc.)
/// 3. Configuration file
/// 4. Defaults
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), BackupError> {
    let disabled = config.map(|c| !c.enabled).unwrap_or(false);
    if disabled {
        return Registry::default()
            .with(EnvFilter::new("off"))
            .with(fmt::layer().with_writer(std::io::sink))
            .try_init()
            .map_err(|e| BackupError::ConfigError(format!("Failed to install logger: {}", e)));
    }

    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;
    let use_color = config.map(|c| c.color).unwrap_or(true) && !output.file;

    let log_file = if output.file {
        Some(resolve_log_file_path(None, config.and_then(|c| c.file.clone()))?)
    } else {
        None
    };
    let writer = build_writer(&output, log_file)?;

    let subscriber = Registry::default().with(filter);
    let installed = if format == "json" {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init()
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(use_color)
                    .with_writer(writer),
            )
            .try_init()
    };
    installed.map_err(|e| BackupError::ConfigError(format!("Failed to install logger: {}", e)))
}

fn open_log_file(path: &Path) -> Result<std::fs::File, BackupError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            BackupError::ConfigError(format!("Failed to create log directory: {}", e))
        })?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| BackupError::ConfigError(format!("Failed to open log file {:?}: {}", path, e)))
}

fn build_writer(
    output: &OutputDestinations,
    log_file: Option<PathBuf>,
) -> Result<BoxMakeWriter, BackupError> {
    let file = match log_file {
        Some(path) => Some(open_log_file(&path)?),
        None => None,
    };
    let writer = match (file, output.stdout, output.stderr) {
        (Some(file), _, true) => BoxMakeWriter::new(file.and(std::io::stderr)),
        (Some(file), _, false) => BoxMakeWriter::new(file),
        (None, true, true) => BoxMakeWriter::new(std::io::stdout.and(std::io::stderr)),
        (None, false, true) => BoxMakeWriter::new(std::io::stderr),
        (None, _, false) => BoxMakeWriter::new(std::io::stdout),
    };
    Ok(writer)
}

/// Build environment filter from config or environment variables
fn build_env_filter(config: Option<&LoggingConfig>) -> Result<EnvFilter, BackupError> {
    if let Ok(filter) = EnvFilter::try_from_env("COLDSTASH_LOG") {
        return Ok(filter);
    }

    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    if level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(level);

    if let Some(config) = config {
        for (module, module_level) in &config.modules {
            let directive = format!("{}={}", module, module_level);
            filter = filter.add_directive(
                directive
                    .parse()
                    .map_err(|e| BackupError::ConfigError(format!("Invalid log directive: {}", e)))?,
            );
        }
    }

    if let Ok(modules_str) = std::env::var("COLDSTASH_LOG_MODULES") {
        for module_spec in modules_str.split(',') {
            if let Some((module, module_level)) = module_spec.split_once('=') {
                let directive = format!("{}={}", module.trim(), module_level.trim());
                filter = filter.add_directive(directive.parse().map_err(|e| {
                    BackupError::ConfigError(format!("Invalid log directive from env: {}", e))
                })?);
            }
        }
    }

    Ok(filter)
}

/// Determine output format from config or environment
fn determine_format(config: Option<&LoggingConfig>) -> Result<String, BackupError> {
    if let Ok(format) = std::env::var("COLDSTASH_LOG_FORMAT") {
        if format == "json" || format == "text" {
            return Ok(format);
        }
    }

    let format = config.map(|c| c.format.as_str()).unwrap_or("text");
    validate_format(format)?;
    Ok(format.to_string())
}

pub(crate) fn validate_format(format: &str) -> Result<(), BackupError> {
    if format != "json" && format != "text" {
        return Err(BackupError::ConfigError(format!(
            "Invalid log format: {} (must be 'json' or 'text')",
            format
        )));
    }
    Ok(())
}

/// Output destinations
#[derive(Debug)]
struct OutputDestinations {
    stdout: bool,
    stderr: bool,
    file: bool,
}

/// Determine output destinations from config or environment
fn determine_output(config: Option<&LoggingConfig>) -> Result<OutputDestinations, BackupError> {
    if let Ok(output) = std::env::var("COLDSTASH_LOG_OUTPUT") {
        return parse_output_destinations(&output);
    }
    let output = config.map(|c| c.output.as_str()).unwrap_or("stderr");
    parse_output_destinations(output)
}

fn parse_output_destinations(output: &str) -> Result<OutputDestinations, BackupError> {
    let (stdout, stderr, file) = match output {
        "stdout" => (true, false, false),
        "stderr" => (false, true, false),
        "file" => (false, false, true),
        "file+stderr" => (false, true, true),
        "both" => (true, true, false),
        _ => {
            return Err(BackupError::ConfigError(format!(
                "Invalid log output: {} (must be 'stdout', 'stderr', 'file', 'file+stderr', or 'both')",
                output
            )))
        }
    };
    Ok(OutputDestinations {
        stdout,
        stderr,
        file,
    })
}

pub(crate) fn validate_output(output: &str) -> Result<(), BackupError> {
    parse_output_destinations(output).map(|_| ())
}
