//! Archive service contract
//!
//! The multi-step upload protocol spoken by cold-storage vaults:
//! initiate, upload parts, then complete or abort. All checksums are
//! hex-encoded SHA-256 tree hashes with 1 MiB leaves.

use crate::error::RemoteError;
use crate::types::{ArchiveReceipt, ByteRange};

/// Remote archive service. Implementations handle authentication and
/// transport timeouts themselves.
pub trait ArchiveService: Send + Sync {
    /// Start a multipart upload; returns the upload session id.
    fn initiate_upload(
        &self,
        vault: &str,
        description: &str,
        part_size: u64,
    ) -> Result<String, RemoteError>;

    /// Upload one part; returns the checksum computed by the service.
    fn upload_part(
        &self,
        upload_id: &str,
        vault: &str,
        range: ByteRange,
        checksum: &str,
        data: &[u8],
    ) -> Result<String, RemoteError>;

    /// Assemble the uploaded parts into an archive.
    fn complete_upload(
        &self,
        upload_id: &str,
        vault: &str,
        archive_size: u64,
        checksum: &str,
    ) -> Result<ArchiveReceipt, RemoteError>;

    /// Discard an upload session and its parts.
    fn abort_upload(&self, upload_id: &str, vault: &str) -> Result<(), RemoteError>;
}
