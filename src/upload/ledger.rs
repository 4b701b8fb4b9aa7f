//! Part Ledger
//!
//! Completed parts keyed by range start. Workers finish parts in any order;
//! the ledger always yields them in byte order so the archive hash folds the
//! leaves correctly.

use crate::tree::TreeHash;
use crate::types::ByteRange;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// A part that was uploaded and acknowledged by the service.
#[derive(Debug, Clone)]
pub struct PartRecord {
    pub range: ByteRange,
    pub tree_hash: TreeHash,
    pub remote_checksum: String,
    pub process_start: Instant,
    pub upload_start: Instant,
    pub upload_end: Instant,
}

impl PartRecord {
    pub fn length(&self) -> u64 {
        self.range.len()
    }

    /// Whether the service reported the same checksum we computed.
    pub fn checksum_matches(&self) -> bool {
        self.remote_checksum.eq_ignore_ascii_case(&self.tree_hash.to_hex())
    }

    pub fn upload_duration(&self) -> Duration {
        self.upload_end.saturating_duration_since(self.upload_start)
    }

    pub fn process_duration(&self) -> Duration {
        self.upload_end.saturating_duration_since(self.process_start)
    }

    /// Average upload speed in bytes per second.
    pub fn upload_speed(&self) -> f64 {
        let secs = self.upload_duration().as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.length() as f64 / secs
    }
}

/// Human-readable speed: MB/s, KB/s or B/s.
pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec > 1_000_000.0 {
        format!("{:.2}MB/s", bytes_per_sec / 1024.0 / 1024.0)
    } else if bytes_per_sec > 1_000.0 {
        format!("{:.2}KB/s", bytes_per_sec / 1024.0)
    } else {
        format!("{:.2}B/s", bytes_per_sec)
    }
}

impl fmt::Display for PartRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes in {:.2}s ({})",
            self.length(),
            self.upload_duration().as_secs_f64(),
            format_speed(self.upload_speed())
        )
    }
}

/// Range-ordered set of completed parts, safe to share between workers.
#[derive(Debug, Default)]
pub struct PartLedger {
    parts: Mutex<BTreeMap<u64, PartRecord>>,
}

impl PartLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a part. Returns false if a part with the same range start
    /// was already recorded; the existing record is kept.
    pub fn add(&self, part: PartRecord) -> bool {
        let mut parts = self.parts.lock();
        if parts.contains_key(&part.range.start) {
            return false;
        }
        parts.insert(part.range.start, part);
        true
    }

    /// Part tree hashes in byte-range order.
    pub fn ordered_hashes(&self) -> Vec<TreeHash> {
        self.parts
            .lock()
            .values()
            .map(|p| p.tree_hash.clone())
            .collect()
    }

    /// Snapshot of all parts in byte-range order.
    pub fn parts(&self) -> Vec<PartRecord> {
        self.parts.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.parts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.lock().is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.parts.lock().values().map(PartRecord::length).sum()
    }

    /// Check that the parts tile `[0, total)` with no gap or overlap.
    pub fn verify_contiguous(&self, total: u64) -> Result<(), String> {
        let parts = self.parts.lock();
        let mut expected = 0u64;
        for part in parts.values() {
            if part.range.start != expected {
                return Err(format!(
                    "expected a part starting at byte {}, found {}",
                    expected, part.range
                ));
            }
            expected = part.range.end + 1;
        }
        if expected != total {
            return Err(format!(
                "parts cover {} bytes but the archive has {} bytes",
                expected, total
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_part(start: u64, len: u64, data: &[u8]) -> PartRecord {
    use crate::tree::{Sha256, TreeDigest};

    let now = Instant::now();
    let tree_hash = Sha256::digest(data);
    PartRecord {
        range: ByteRange::from_offset(start, len),
        remote_checksum: tree_hash.to_hex(),
        tree_hash,
        process_start: now,
        upload_start: now,
        upload_end: now,
    }
}
