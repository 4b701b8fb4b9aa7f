//! CLI Tooling
//!
//! Command-line interface for backups, change detection, uploads and tree
//! hashing. Commands return their rendered output as a string; the binary
//! prints it.

use crate::backup::{BackupOutcome, BackupRequest, BackupRunner};
use crate::chunk::ChunkReader;
use crate::config::{BackupConfig, ConfigLoader};
use crate::diff::{ChangeDetector, ChangeSet};
use crate::error::BackupError;
use crate::logging::LoggingConfig;
use crate::tree::{hash_reader, Sha256, TREE_HASH_BLOCK_SIZE};
use crate::upload::{format_speed, LocalVault, MultipartUpload, PartRecord};
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde_json::json;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

/// coldstash - incremental backups to cold storage
#[derive(Parser)]
#[command(name = "coldstash")]
#[command(about = "Incremental, tree-hash verified backups to cold-storage vaults")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config file)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Apply logging flags on top of the configured logging section.
    pub fn apply_logging_overrides(&self, logging: &mut LoggingConfig) {
        if let Some(level) = &self.log_level {
            logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            logging.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            logging.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            logging.file = Some(file.clone());
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Back up changed directories: SOURCES... TARBALL
    Backup {
        /// Source roots followed by the output tarball path
        #[arg(required = true, num_args = 2..)]
        paths: Vec<PathBuf>,
        /// Directory for fingerprint stores and the run index
        #[arg(long)]
        meta: Option<PathBuf>,
        /// Append to an existing tarball
        #[arg(short = 'a', long)]
        append: bool,
        /// Replace an existing tarball
        #[arg(short = 'o', long)]
        overwrite: bool,
        /// Package only, skip the upload
        #[arg(long)]
        no_upload: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Detect changed directories under ROOT and record their fingerprints
    Changes {
        root: PathBuf,
        /// Directory for fingerprint stores
        #[arg(long)]
        meta: Option<PathBuf>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Upload a file to the configured vault
    Upload {
        file: PathBuf,
        /// Part size in bytes (default: chosen from the file size)
        #[arg(long)]
        chunk_size: Option<u64>,
        /// Concurrent part uploads (default: chosen from the file size)
        #[arg(long)]
        workers: Option<usize>,
        /// Archive description (default: the file path)
        #[arg(long)]
        description: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the SHA-256 tree hash of a file
    TreeHash {
        file: PathBuf,
        /// Leaf block size in bytes
        #[arg(long, default_value_t = TREE_HASH_BLOCK_SIZE)]
        block_size: usize,
    },
    /// Print the effective configuration as TOML
    Config,
}

/// CLI context: loaded configuration plus the archive service.
pub struct CliContext {
    config: BackupConfig,
    vault: LocalVault,
}

impl CliContext {
    /// Create a new CLI context from layered configuration.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, BackupError> {
        let config = ConfigLoader::load(config_path.as_deref())?;
        Self::from_config(config)
    }

    pub fn from_config(config: BackupConfig) -> Result<Self, BackupError> {
        let vault = LocalVault::new(config.vault.resolved_root()?);
        Ok(Self { config, vault })
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn vault(&self) -> &LocalVault {
        &self.vault
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, BackupError> {
        match command {
            Commands::Backup {
                paths,
                meta,
                append,
                overwrite,
                no_upload,
                format,
            } => {
                let json = wants_json(format)?;
                let Some((tarball, sources)) = paths.split_last() else {
                    return Err(BackupError::InvalidArgument(
                        "Output tarball path must be specified".to_string(),
                    ));
                };
                let request = BackupRequest {
                    sources: sources.to_vec(),
                    tarball: tarball.clone(),
                    metadata_dir: meta.clone(),
                    append: *append,
                    overwrite: *overwrite,
                    upload: !*no_upload,
                };
                let outcome = BackupRunner::new(&self.config, &self.vault).run(&request)?;
                if json {
                    to_json(&outcome)
                } else {
                    Ok(format_backup_text(&outcome))
                }
            }
            Commands::Changes { root, meta, format } => {
                let json = wants_json(format)?;
                let metadata_dir = meta.clone().or_else(|| self.config.metadata_dir.clone());
                let changes = ChangeDetector::new(metadata_dir).detect_changes(root)?;
                if json {
                    to_json(&json!({
                        "root": root,
                        "changed": changes.changed_dirs(),
                        "store_file": changes.store_file(),
                    }))
                } else {
                    Ok(format_changes_text(root, &changes))
                }
            }
            Commands::Upload {
                file,
                chunk_size,
                workers,
                description,
                format,
            } => self.handle_upload(file, *chunk_size, *workers, description.as_deref(), format),
            Commands::TreeHash { file, block_size } => {
                if *block_size == 0 {
                    return Err(BackupError::InvalidArgument(
                        "Block size must be greater than zero".to_string(),
                    ));
                }
                let reader = ChunkReader::new(File::open(file)?, *block_size)?;
                let hash = hash_reader::<Sha256, _>(&reader)?;
                Ok(format!("{}  {}", hash, file.display()))
            }
            Commands::Config => self.config.to_toml(),
        }
    }

    fn handle_upload(
        &self,
        file: &Path,
        chunk_size: Option<u64>,
        workers: Option<usize>,
        description: Option<&str>,
        format: &str,
    ) -> Result<String, BackupError> {
        let json = wants_json(format)?;
        let upload_config = &self.config.upload;

        let mut settings = upload_config.policy().for_file(file);
        if let Some(chunk_size) = chunk_size {
            settings.chunk_size = chunk_size;
        }
        if let Some(workers) = workers {
            settings.workers = workers;
        }

        let mut job = MultipartUpload::new(&self.vault, file, self.config.vault.name.as_str(), settings)
            .with_retry(upload_config.retry())
            .with_wait(upload_config.wait_initial(), upload_config.wait_max());
        if let Some(description) = description {
            job = job.with_description(description);
        }

        let receipt = job.run()?;
        let parts = job.parts();
        info!(archive_id = %receipt.archive_id, parts = parts.len(), "Upload finished");

        if json {
            let parts: Vec<_> = parts
                .iter()
                .map(|p| {
                    json!({
                        "start": p.range.start,
                        "end": p.range.end,
                        "length": p.length(),
                        "tree_hash": p.tree_hash.to_hex(),
                        "checksum_matches": p.checksum_matches(),
                        "upload_ms": p.upload_duration().as_millis() as u64,
                    })
                })
                .collect();
            return to_json(&json!({
                "vault": self.config.vault.name,
                "archive_id": receipt.archive_id,
                "checksum": receipt.checksum,
                "verified": job.checksum_verified(),
                "size": job.uploaded_bytes(),
                "chunk_size": settings.chunk_size,
                "workers": settings.workers,
                "parts": parts,
            }));
        }

        let mut out = String::new();
        out.push_str(&format!("Archive ID: {}\n", receipt.archive_id));
        out.push_str(&format!("Checksum:   {}\n", receipt.checksum));
        out.push_str(&format!(
            "Size:       {} bytes in {} parts ({} workers)\n",
            job.uploaded_bytes(),
            parts.len(),
            settings.workers
        ));
        if !job.checksum_verified() {
            out.push_str("Warning: archive checksum differs from the local tree hash\n");
        }
        if !parts.is_empty() {
            out.push('\n');
            out.push_str(&format_parts_table(&parts));
        }
        Ok(out)
    }
}

fn wants_json(format: &str) -> Result<bool, BackupError> {
    match format {
        "json" => Ok(true),
        "text" => Ok(false),
        other => Err(BackupError::InvalidArgument(format!(
            "Invalid output format: {} (must be 'text' or 'json')",
            other
        ))),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, BackupError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| BackupError::InvalidArgument(format!("Failed to render JSON: {}", e)))
}

fn format_parts_table(parts: &[PartRecord]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Range", "Bytes", "Time", "Speed", "Checksum"]);
    for part in parts {
        table.add_row(vec![
            part.range.to_string(),
            part.length().to_string(),
            format!("{:.2}s", part.upload_duration().as_secs_f64()),
            format_speed(part.upload_speed()),
            if part.checksum_matches() { "ok" } else { "MISMATCH" }.to_string(),
        ]);
    }
    table.to_string()
}

fn format_changes_text(root: &Path, changes: &ChangeSet) -> String {
    if changes.is_empty() {
        return format!("No changes under {}", root.display());
    }
    let mut out = format!(
        "{} directories changed under {}\n",
        changes.changed_dirs().len(),
        root.display()
    );
    for dir in changes.changed_dirs() {
        out.push_str(&format!("  {}\n", dir.display()));
    }
    if let Some(store) = changes.store_file() {
        out.push_str(&format!("Fingerprints: {}\n", store.display()));
    }
    out
}

fn format_backup_text(outcome: &BackupOutcome) -> String {
    if outcome.is_noop() {
        return "No changes detected".to_string();
    }
    let mut out = format!("Changed paths: {}\n", outcome.changed.len());
    match &outcome.tarball {
        Some(path) => out.push_str(&format!(
            "Tarball:       {} ({} entries)\n",
            path.display(),
            outcome.entries.len()
        )),
        None => out.push_str("Tarball:       skipped (already exists)\n"),
    }
    if let Some(receipt) = &outcome.receipt {
        out.push_str(&format!("Archive ID:    {}\n", receipt.archive_id));
        out.push_str(&format!("Checksum:      {}\n", receipt.checksum));
        out.push_str(&format!("Parts:         {}\n", outcome.parts));
    }
    if let Some(index) = &outcome.index {
        out.push_str(&format!("Index:         {}\n", index.display()));
    }
    out
}
