//! In-memory archive service for unit tests.

use super::service::ArchiveService;
use crate::error::RemoteError;
use crate::types::{ArchiveReceipt, ByteRange};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    attempts: HashMap<u64, u32>,
    upload_calls: usize,
    uploads_after_abort: usize,
    complete_calls: Vec<(u64, String)>,
    abort_calls: usize,
}

/// Records every call and fails on request.
#[derive(Debug, Default)]
pub(crate) struct MockArchiveService {
    failing_parts: HashMap<u64, u32>,
    fail_initiate: bool,
    reject_complete: bool,
    transient_complete_failures: usize,
    wrong_checksums: bool,
    jitter: bool,
    state: Mutex<MockState>,
}

impl MockArchiveService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `times` attempts of the part starting at `start`.
    pub fn fail_part(mut self, start: u64, times: u32) -> Self {
        self.failing_parts.insert(start, times);
        self
    }

    pub fn fail_initiate(mut self) -> Self {
        self.fail_initiate = true;
        self
    }

    pub fn reject_complete(mut self) -> Self {
        self.reject_complete = true;
        self
    }

    /// Report the service unavailable for the first `times` completions.
    pub fn fail_complete(mut self, times: usize) -> Self {
        self.transient_complete_failures = times;
        self
    }

    pub fn wrong_part_checksums(mut self) -> Self {
        self.wrong_checksums = true;
        self
    }

    /// Delay part uploads by a few milliseconds so parts finish out of order.
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    pub fn upload_attempts_for(&self, start: u64) -> u32 {
        self.state.lock().attempts.get(&start).copied().unwrap_or(0)
    }

    pub fn upload_calls(&self) -> usize {
        self.state.lock().upload_calls
    }

    pub fn uploads_after_abort(&self) -> usize {
        self.state.lock().uploads_after_abort
    }

    pub fn complete_calls(&self) -> Vec<(u64, String)> {
        self.state.lock().complete_calls.clone()
    }

    pub fn abort_calls(&self) -> usize {
        self.state.lock().abort_calls
    }
}

impl ArchiveService for MockArchiveService {
    fn initiate_upload(
        &self,
        vault: &str,
        _description: &str,
        _part_size: u64,
    ) -> Result<String, RemoteError> {
        if self.fail_initiate {
            return Err(RemoteError::Unavailable(format!("vault {} offline", vault)));
        }
        Ok("mock-upload".to_string())
    }

    fn upload_part(
        &self,
        _upload_id: &str,
        _vault: &str,
        range: ByteRange,
        checksum: &str,
        data: &[u8],
    ) -> Result<String, RemoteError> {
        if self.jitter {
            thread::sleep(Duration::from_millis(range.start % 5));
        }

        let attempt = {
            let mut state = self.state.lock();
            state.upload_calls += 1;
            if state.abort_calls > 0 {
                state.uploads_after_abort += 1;
            }
            let attempt = state.attempts.entry(range.start).or_insert(0);
            *attempt += 1;
            *attempt
        };

        if data.len() as u64 != range.len() {
            return Err(RemoteError::Rejected(format!(
                "range {} does not match {} bytes",
                range,
                data.len()
            )));
        }
        if let Some(&times) = self.failing_parts.get(&range.start) {
            if attempt <= times {
                return Err(RemoteError::Unavailable(format!(
                    "part {} attempt {}",
                    range, attempt
                )));
            }
        }
        if self.wrong_checksums {
            return Ok("ff".repeat(32));
        }
        Ok(checksum.to_string())
    }

    fn complete_upload(
        &self,
        _upload_id: &str,
        _vault: &str,
        archive_size: u64,
        checksum: &str,
    ) -> Result<ArchiveReceipt, RemoteError> {
        let calls = {
            let mut state = self.state.lock();
            state
                .complete_calls
                .push((archive_size, checksum.to_string()));
            state.complete_calls.len()
        };
        if self.reject_complete {
            return Err(RemoteError::Rejected("checksum mismatch".to_string()));
        }
        if calls <= self.transient_complete_failures {
            return Err(RemoteError::Unavailable("try again".to_string()));
        }
        Ok(ArchiveReceipt {
            archive_id: format!("archive-{}", calls),
            checksum: checksum.to_string(),
        })
    }

    fn abort_upload(&self, _upload_id: &str, _vault: &str) -> Result<(), RemoteError> {
        self.state.lock().abort_calls += 1;
        Ok(())
    }
}
