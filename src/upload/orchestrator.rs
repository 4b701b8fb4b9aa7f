//! Multipart Upload Orchestrator
//!
//! Drives one upload session through initiate, concurrent part upload and
//! completion. The orchestrator is the only place where remote failures are
//! judged: parts are retried by the workers, and anything fatal ends in a
//! single remote abort so no session is left dangling.

use super::ledger::{PartLedger, PartRecord};
use super::policy::{RetryPolicy, UploadSettings};
use super::service::ArchiveService;
use super::worker::PartWorker;
use crate::chunk::ChunkReader;
use crate::concurrency::{Backoff, PoolGate};
use crate::error::BackupError;
use crate::tree::{fold_leaves, Sha256, TreeHash};
use crate::types::ArchiveReceipt;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Initial wait between pool progress checks.
pub const DEFAULT_WAIT_INITIAL: Duration = Duration::from_millis(500);
/// Upper bound for the wait between pool progress checks.
pub const DEFAULT_WAIT_MAX: Duration = Duration::from_secs(10);

/// Lifecycle of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    New,
    Initiated,
    Uploading,
    Completed,
    Aborted,
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadState::New => "new",
            UploadState::Initiated => "initiated",
            UploadState::Uploading => "uploading",
            UploadState::Completed => "completed",
            UploadState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// One multipart upload of a file to an archive service.
pub struct MultipartUpload<'a, S: ?Sized> {
    service: &'a S,
    source: PathBuf,
    vault: String,
    description: String,
    settings: UploadSettings,
    retry: RetryPolicy,
    wait_initial: Duration,
    wait_max: Duration,
    ledger: PartLedger,
    state: UploadState,
    upload_id: Option<String>,
    uploaded_bytes: u64,
    archive_hash: Option<TreeHash>,
    receipt: Option<ArchiveReceipt>,
}

impl<'a, S: ArchiveService + ?Sized> MultipartUpload<'a, S> {
    pub fn new(
        service: &'a S,
        source: impl Into<PathBuf>,
        vault: impl Into<String>,
        settings: UploadSettings,
    ) -> Self {
        let source = source.into();
        let description = source.display().to_string();
        Self {
            service,
            source,
            vault: vault.into(),
            description,
            settings,
            retry: RetryPolicy::default(),
            wait_initial: DEFAULT_WAIT_INITIAL,
            wait_max: DEFAULT_WAIT_MAX,
            ledger: PartLedger::new(),
            state: UploadState::New,
            upload_id: None,
            uploaded_bytes: 0,
            archive_hash: None,
            receipt: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Bounds of the capped exponential backoff used while waiting on the pool.
    pub fn with_wait(mut self, initial: Duration, max: Duration) -> Self {
        self.wait_initial = initial;
        self.wait_max = max;
        self
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn settings(&self) -> UploadSettings {
        self.settings
    }

    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    pub fn receipt(&self) -> Option<&ArchiveReceipt> {
        self.receipt.as_ref()
    }

    pub fn archive_id(&self) -> Option<&str> {
        self.receipt.as_ref().map(|r| r.archive_id.as_str())
    }

    pub fn checksum(&self) -> Option<&str> {
        self.receipt.as_ref().map(|r| r.checksum.as_str())
    }

    /// Tree hash computed locally from the uploaded parts.
    pub fn archive_hash(&self) -> Option<&TreeHash> {
        self.archive_hash.as_ref()
    }

    /// Bytes read from the source during `upload`.
    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded_bytes
    }

    /// Uploaded parts in byte order.
    pub fn parts(&self) -> Vec<PartRecord> {
        self.ledger.parts()
    }

    /// Initiate, upload and complete in one call.
    pub fn run(&mut self) -> Result<ArchiveReceipt, BackupError> {
        self.initialise()?;
        self.upload()?;
        self.complete()
    }

    /// Open an upload session with the service. Failure is not retried.
    pub fn initialise(&mut self) -> Result<(), BackupError> {
        self.expect_state(UploadState::New, "initialise")?;

        if let Err(e) = self.settings.validate() {
            self.state = UploadState::Aborted;
            return Err(BackupError::InvalidArgument(e));
        }
        if !self.settings.is_tree_hash_aligned() {
            warn!(
                chunk_size = self.settings.chunk_size,
                "Chunk size is not a power-of-two number of MiB; the service may reject the archive checksum"
            );
        }

        info!(
            source = %self.source.display(),
            chunk_size = self.settings.chunk_size,
            workers = self.settings.workers,
            "Initiating upload"
        );

        match self
            .service
            .initiate_upload(&self.vault, &self.description, self.settings.chunk_size)
        {
            Ok(upload_id) => {
                info!(upload_id = %upload_id, vault = %self.vault, "Starting upload");
                self.upload_id = Some(upload_id);
                self.state = UploadState::Initiated;
                Ok(())
            }
            Err(e) => {
                error!(vault = %self.vault, error = %e, "Failed to initiate upload");
                self.state = UploadState::Aborted;
                Err(e.into())
            }
        }
    }

    /// Upload the whole source with a fixed pool of workers.
    ///
    /// Blocks until every worker has exited. On a fatal failure the session
    /// is aborted and an error is returned.
    pub fn upload(&mut self) -> Result<(), BackupError> {
        self.expect_state(UploadState::Initiated, "upload")?;
        self.state = UploadState::Uploading;

        let Some(upload_id) = self.upload_id.clone() else {
            self.state = UploadState::Aborted;
            return Err(BackupError::InvalidState {
                operation: "upload",
                state: "initiated without a session id".to_string(),
            });
        };

        let reader = match File::open(&self.source)
            .and_then(|file| ChunkReader::new(file, self.settings.chunk_size as usize))
        {
            Ok(reader) => reader,
            Err(e) => {
                error!(source = %self.source.display(), error = %e, "Unable to open upload source");
                self.abort();
                return Err(e.into());
            }
        };

        let gate = PoolGate::new();
        let mut backoff = Backoff::new(self.wait_initial, self.wait_max);
        let service = self.service;
        let vault = self.vault.as_str();
        let ledger = &self.ledger;
        let retry = self.retry;

        debug!(workers = self.settings.workers, "Creating upload workers");
        thread::scope(|scope| {
            for id in 0..self.settings.workers {
                let guard = gate.enter();
                let worker = PartWorker {
                    id,
                    service,
                    upload_id: &upload_id,
                    vault,
                    reader: &reader,
                    ledger,
                    gate: &gate,
                    retry,
                };
                scope.spawn(move || worker.run(guard));
            }

            while !gate.wait_idle(backoff.next_wait()) {
                debug!(
                    parts = ledger.len(),
                    phase = %gate.phase(),
                    "Upload pool running"
                );
            }
        });

        self.uploaded_bytes = reader.position();

        if let Some(reason) = gate.abort_reason() {
            error!(upload_id = %upload_id, reason = %reason, "Upload failed");
            self.abort();
            return Err(BackupError::UploadAborted(reason));
        }

        info!(
            upload_id = %upload_id,
            parts = self.ledger.len(),
            bytes = self.uploaded_bytes,
            "Upload pool finished"
        );
        Ok(())
    }

    /// Fold the part hashes and ask the service to assemble the archive.
    ///
    /// Any failure aborts the session.
    pub fn complete(&mut self) -> Result<ArchiveReceipt, BackupError> {
        self.expect_state(UploadState::Uploading, "complete")?;

        match self.finish_session() {
            Ok(receipt) => {
                info!(
                    upload_id = self.upload_id.as_deref().unwrap_or_default(),
                    archive_id = %receipt.archive_id,
                    "Completed upload"
                );
                self.state = UploadState::Completed;
                self.receipt = Some(receipt.clone());
                Ok(receipt)
            }
            Err(e) => {
                error!(error = %e, "Upload completion failed");
                self.abort();
                Err(e)
            }
        }
    }

    fn finish_session(&mut self) -> Result<ArchiveReceipt, BackupError> {
        let upload_id = self.upload_id.clone().unwrap_or_default();

        self.ledger
            .verify_contiguous(self.uploaded_bytes)
            .map_err(BackupError::Integrity)?;

        debug!(parts = self.ledger.len(), "Calculating archive hash");
        let archive_hash = fold_leaves::<Sha256>(self.ledger.ordered_hashes());
        let checksum = archive_hash.to_hex();
        debug!(archive_hash = %checksum, size = self.uploaded_bytes, "Calculated archive hash");

        let mut attempt = 1;
        let receipt = loop {
            match self.service.complete_upload(
                &upload_id,
                &self.vault,
                self.uploaded_bytes,
                &checksum,
            ) {
                Ok(receipt) => break receipt,
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    warn!(upload_id = %upload_id, attempt, error = %e, "Completion failed, retrying");
                    thread::sleep(self.retry.delay);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        if !receipt.checksum.eq_ignore_ascii_case(&checksum) {
            warn!(
                archive_id = %receipt.archive_id,
                received = %receipt.checksum,
                expected = %checksum,
                "Archive checksum returned by the service does not match the local tree hash"
            );
        }
        self.archive_hash = Some(archive_hash);
        Ok(receipt)
    }

    /// Whether the service's archive checksum matches the local tree hash.
    pub fn checksum_verified(&self) -> bool {
        match (&self.receipt, &self.archive_hash) {
            (Some(receipt), Some(hash)) => receipt.checksum.eq_ignore_ascii_case(&hash.to_hex()),
            _ => false,
        }
    }

    /// Abort the remote session, if one is open. Never fails; errors are logged.
    ///
    /// Before a session is initiated this does nothing, so the upload can
    /// still be started.
    pub fn abort(&mut self) {
        match self.state {
            UploadState::Completed | UploadState::Aborted => return,
            UploadState::New if self.upload_id.is_none() => return,
            _ => self.state = UploadState::Aborted,
        }

        let Some(upload_id) = &self.upload_id else {
            return;
        };
        match self.service.abort_upload(upload_id, &self.vault) {
            Ok(()) => warn!(upload_id = %upload_id, "Aborted upload"),
            Err(e) => error!(upload_id = %upload_id, error = %e, "Failed to abort upload"),
        }
    }

    fn expect_state(&self, expected: UploadState, operation: &'static str) -> Result<(), BackupError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(BackupError::InvalidState {
                operation,
                state: self.state.to_string(),
            })
        }
    }
}
