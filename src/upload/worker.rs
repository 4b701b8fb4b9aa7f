//! Upload pool workers.
//!
//! Each worker loops: take the next chunk from the shared reader, upload it
//! with retries, record it in the ledger, repeat while the pool is running.
//! The first worker to see end-of-input moves the pool to draining; the
//! others finish their current part and exit.

use super::ledger::{PartLedger, PartRecord};
use super::policy::RetryPolicy;
use super::service::ArchiveService;
use crate::chunk::{Chunk, ChunkReader};
use crate::concurrency::{PoolGate, WorkerGuard};
use crate::error::RemoteError;
use crate::tree::{hash_bytes, Sha256, TREE_HASH_BLOCK_SIZE};
use crate::types::ByteRange;
use std::io::Read;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Why a part could not be uploaded.
#[derive(Debug)]
pub(crate) enum PartFailure {
    /// Retry budget spent.
    Exhausted { attempts: u32, error: RemoteError },
    /// Pool aborted while waiting to retry.
    Abandoned,
}

pub(crate) struct PartWorker<'a, S: ?Sized, R> {
    pub id: usize,
    pub service: &'a S,
    pub upload_id: &'a str,
    pub vault: &'a str,
    pub reader: &'a ChunkReader<R>,
    pub ledger: &'a PartLedger,
    pub gate: &'a PoolGate,
    pub retry: RetryPolicy,
}

impl<S: ArchiveService + ?Sized, R: Read> PartWorker<'_, S, R> {
    /// Run until input is exhausted or the pool stops. `_guard` keeps the
    /// worker counted as active until this returns.
    pub fn run(self, _guard: WorkerGuard<'_>) {
        debug!(worker_id = self.id, "Upload worker started");

        while self.gate.is_running() {
            let process_start = Instant::now();
            let chunk = match self.reader.read_chunk() {
                Ok(chunk) => chunk,
                Err(e) => {
                    error!(worker_id = self.id, error = %e, "Unable to read upload source");
                    self.gate.abort(format!("failed to read upload source: {}", e));
                    break;
                }
            };

            let Some(range) = chunk.range() else {
                if self.gate.finish() {
                    debug!(worker_id = self.id, "No data left, stopping upload pool");
                }
                break;
            };

            if self.gate.is_aborting() {
                debug!(worker_id = self.id, range = %range, "Pool aborting, dropping part");
                break;
            }

            match self.upload_with_retry(&chunk, range, process_start) {
                Ok(record) => {
                    info!(worker_id = self.id, range = %range, "Part upload complete: uploaded {}", record);
                    if !self.ledger.add(record) {
                        warn!(range = %range, "Part already recorded, ignoring duplicate");
                    }
                }
                Err(PartFailure::Abandoned) => {
                    warn!(worker_id = self.id, range = %range, "Retry abandoned, pool is aborting");
                    break;
                }
                Err(PartFailure::Exhausted { attempts, error }) => {
                    error!(
                        worker_id = self.id,
                        range = %range,
                        attempts,
                        error = %error,
                        "Too many upload failures, giving up"
                    );
                    self.gate.abort(format!(
                        "part {} failed after {} attempts: {}",
                        range, attempts, error
                    ));
                    break;
                }
            }

            self.gate.notify();
        }

        debug!(worker_id = self.id, "Upload worker stopped");
    }

    fn upload_with_retry(
        &self,
        chunk: &Chunk,
        range: ByteRange,
        process_start: Instant,
    ) -> Result<PartRecord, PartFailure> {
        let tree_hash = hash_bytes::<Sha256>(chunk.data(), TREE_HASH_BLOCK_SIZE);
        let checksum = tree_hash.to_hex();
        debug!(range = %range, part_hash = %checksum, "Calculated part hash");

        let mut attempt = 1;
        loop {
            debug!(
                worker_id = self.id,
                range = %range.content_range(),
                bytes = chunk.len(),
                attempt,
                "Uploading part"
            );
            let upload_start = Instant::now();
            match self
                .service
                .upload_part(self.upload_id, self.vault, range, &checksum, chunk.data())
            {
                Ok(remote_checksum) => {
                    if !remote_checksum.eq_ignore_ascii_case(&checksum) {
                        warn!(
                            range = %range,
                            received = %remote_checksum,
                            expected = %checksum,
                            "Returned checksum does not match locally calculated hash"
                        );
                    }
                    return Ok(PartRecord {
                        range,
                        tree_hash,
                        remote_checksum,
                        process_start,
                        upload_start,
                        upload_end: Instant::now(),
                    });
                }
                Err(error) if attempt < self.retry.max_attempts => {
                    warn!(
                        worker_id = self.id,
                        range = %range,
                        attempt,
                        error = %error,
                        "Part upload failed, retrying"
                    );
                    if !self.gate.pause(self.retry.delay) {
                        return Err(PartFailure::Abandoned);
                    }
                    attempt += 1;
                }
                Err(error) => {
                    return Err(PartFailure::Exhausted {
                        attempts: attempt,
                        error,
                    })
                }
            }
        }
    }
}
