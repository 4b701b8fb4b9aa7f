//! Core types shared by the change detector and the upload engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fingerprint: hex digest summarising file metadata (see `diff`).
pub type Fingerprint = String;

/// Inclusive byte range of a part within the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Range covering `len` bytes starting at `start`. `len` must be non-zero.
    pub fn from_offset(start: u64, len: u64) -> Self {
        debug_assert!(len > 0, "byte range must cover at least one byte");
        Self {
            start,
            end: start + len - 1,
        }
    }

    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A range always covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Content-range header form used by the archive protocol.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/*", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Archive identity returned by the service when an upload completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReceipt {
    pub archive_id: String,
    pub checksum: String,
}
