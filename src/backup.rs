//! Backup pipeline
//!
//! One run: detect changed directories under each source root, pack them
//! into a tarball, upload the tarball and write the run index next to it
//! (or into the metadata directory).

use crate::config::BackupConfig;
use crate::diff::ChangeDetector;
use crate::error::BackupError;
use crate::package::{index_path, RunIndex, Tarball};
use crate::types::ArchiveReceipt;
use crate::upload::{ArchiveService, MultipartUpload};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// What to back up and where to put it.
#[derive(Debug, Clone, Default)]
pub struct BackupRequest {
    /// Source roots; entry names are relative to the first
    pub sources: Vec<PathBuf>,
    pub tarball: PathBuf,
    /// Overrides the configured metadata directory
    pub metadata_dir: Option<PathBuf>,
    pub append: bool,
    pub overwrite: bool,
    pub upload: bool,
}

impl BackupRequest {
    pub fn new(sources: Vec<PathBuf>, tarball: impl Into<PathBuf>) -> Self {
        Self {
            sources,
            tarball: tarball.into(),
            upload: true,
            ..Self::default()
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackupOutcome {
    /// Changed directories and fingerprint stores, in detection order
    pub changed: Vec<PathBuf>,
    /// Tarball written by this run
    pub tarball: Option<PathBuf>,
    pub entries: Vec<String>,
    pub receipt: Option<ArchiveReceipt>,
    pub checksum_verified: bool,
    pub parts: usize,
    pub index: Option<PathBuf>,
}

impl BackupOutcome {
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Runs backups against one archive service.
pub struct BackupRunner<'a, S: ?Sized> {
    config: &'a BackupConfig,
    service: &'a S,
}

impl<'a, S: ArchiveService + ?Sized> BackupRunner<'a, S> {
    pub fn new(config: &'a BackupConfig, service: &'a S) -> Self {
        Self { config, service }
    }

    pub fn run(&self, request: &BackupRequest) -> Result<BackupOutcome, BackupError> {
        let Some(first_root) = request.sources.first() else {
            return Err(BackupError::InvalidArgument(
                "At least one source directory is required".to_string(),
            ));
        };
        if request.tarball.as_os_str().is_empty() {
            return Err(BackupError::InvalidArgument(
                "Output tarball path must be specified".to_string(),
            ));
        }

        let metadata_dir = request
            .metadata_dir
            .clone()
            .or_else(|| self.config.metadata_dir.clone());
        let detector = ChangeDetector::new(metadata_dir.clone());

        let mut outcome = BackupOutcome::default();
        for source in &request.sources {
            info!(root = %source.display(), "Checking for changes");
            outcome
                .changed
                .extend(detector.detect_changes(source)?.into_paths());
        }
        info!(changed = outcome.changed.len(), "Directories identified with changes");

        if outcome.changed.is_empty() {
            info!("No files selected for tarball");
            return Ok(outcome);
        }

        let tarball = self.package(request, first_root, &outcome.changed)?;

        let mut upload_error = None;
        if let Some(tarball) = &tarball {
            outcome.tarball = Some(tarball.path().to_path_buf());
            outcome.entries = tarball.entries()?;

            if request.upload {
                match self.upload(tarball) {
                    Ok((receipt, verified, parts)) => {
                        info!(archive_id = %receipt.archive_id, "Uploaded archive");
                        outcome.receipt = Some(receipt);
                        outcome.checksum_verified = verified;
                        outcome.parts = parts;
                    }
                    Err(e) => {
                        error!(tarball = %tarball.path().display(), error = %e, "Upload failed");
                        upload_error = Some(e);
                    }
                }
            } else {
                info!("Upload skipped");
            }
        }

        if outcome.tarball.is_some() || outcome.receipt.is_some() {
            outcome.index = self.write_index(request, metadata_dir, &outcome);
        }

        match upload_error {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    /// Build the tarball. Returns None when an existing tarball is left alone.
    fn package(
        &self,
        request: &BackupRequest,
        root: &std::path::Path,
        paths: &[PathBuf],
    ) -> Result<Option<Tarball>, BackupError> {
        let exists = request.tarball.exists();
        if request.overwrite && exists {
            fs::remove_file(&request.tarball)?;
        } else if exists && !request.append {
            warn!(
                tarball = %request.tarball.display(),
                "Tarball file already exists and neither overwrite nor append is set"
            );
            return Ok(None);
        }

        let append = request.append && !request.overwrite;
        Tarball::create(&request.tarball, root, paths, append).map(Some)
    }

    fn upload(&self, tarball: &Tarball) -> Result<(ArchiveReceipt, bool, usize), BackupError> {
        let upload_config = &self.config.upload;
        let settings = upload_config.policy().for_file(tarball.path());

        let mut job = MultipartUpload::new(
            self.service,
            tarball.path(),
            self.config.vault.name.as_str(),
            settings,
        )
        .with_retry(upload_config.retry())
        .with_wait(upload_config.wait_initial(), upload_config.wait_max());

        let receipt = job.run()?;
        Ok((receipt, job.checksum_verified(), job.parts().len()))
    }

    fn write_index(
        &self,
        request: &BackupRequest,
        metadata_dir: Option<PathBuf>,
        outcome: &BackupOutcome,
    ) -> Option<PathBuf> {
        let path = index_path(&request.tarball, metadata_dir.as_deref());
        let mut index = RunIndex::new().with_entries(outcome.entries.clone());
        if let Some(receipt) = &outcome.receipt {
            index = index.with_archive(&receipt.archive_id, &receipt.checksum);
        }

        match index.write(&path) {
            Ok(()) => {
                info!(path = %path.display(), "Written index");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unable to write index file");
                None
            }
        }
    }
}
