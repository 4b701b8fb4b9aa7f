//! Filesystem-backed archive service.
//!
//! Behaves like a remote cold-storage vault: it computes its own part and
//! archive checksums, tracks open sessions on disk and refuses to complete
//! an archive whose checksum disagrees with the assembled bytes.
//!
//! Layout under the vault root:
//!
//! ```text
//! <root>/<vault>/uploads/<upload_id>/session.json
//! <root>/<vault>/uploads/<upload_id>/<start>-<end>.part
//! <root>/<vault>/archives/<archive_id>
//! <root>/<vault>/archives/<archive_id>.json
//! ```

use super::service::ArchiveService;
use crate::chunk::ChunkReader;
use crate::error::RemoteError;
use crate::tree::{hash_bytes, hash_reader, Sha256, TREE_HASH_BLOCK_SIZE};
use crate::types::{ArchiveReceipt, ByteRange};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

const SESSION_FILE: &str = "session.json";
const PART_EXTENSION: &str = "part";

/// Persisted state of an open upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSessionRecord {
    pub upload_id: String,
    pub vault: String,
    pub description: String,
    pub part_size: u64,
    pub created_at: String,
}

/// Metadata stored beside each assembled archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub archive_id: String,
    pub description: String,
    pub size: u64,
    pub checksum: String,
    pub created_at: String,
}

/// Archive service storing vaults as directories.
#[derive(Debug)]
pub struct LocalVault {
    root: PathBuf,
    sequence: AtomicU64,
}

impl LocalVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn vault_dir(&self, vault: &str) -> Result<PathBuf, RemoteError> {
        if vault.is_empty() || vault.contains(['/', '\\']) || vault == "." || vault == ".." {
            return Err(RemoteError::Rejected(format!("invalid vault name '{}'", vault)));
        }
        Ok(self.root.join(vault))
    }

    fn session_dir(&self, vault: &str, upload_id: &str) -> Result<PathBuf, RemoteError> {
        if upload_id.is_empty() || !upload_id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RemoteError::SessionNotFound(upload_id.to_string()));
        }
        Ok(self.vault_dir(vault)?.join("uploads").join(upload_id))
    }

    fn load_session(&self, vault: &str, upload_id: &str) -> Result<(PathBuf, UploadSessionRecord), RemoteError> {
        let dir = self.session_dir(vault, upload_id)?;
        let raw = match fs::read_to_string(dir.join(SESSION_FILE)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RemoteError::SessionNotFound(upload_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let session = serde_json::from_str(&raw)
            .map_err(|e| RemoteError::Rejected(format!("corrupt session {}: {}", upload_id, e)))?;
        Ok((dir, session))
    }

    /// Path of an assembled archive.
    pub fn archive_path(&self, vault: &str, archive_id: &str) -> Result<PathBuf, RemoteError> {
        Ok(self.vault_dir(vault)?.join("archives").join(archive_id))
    }

    /// Metadata of an assembled archive.
    pub fn archive_record(&self, vault: &str, archive_id: &str) -> Result<ArchiveRecord, RemoteError> {
        let path = self.archive_path(vault, archive_id)?.with_extension("json");
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| RemoteError::Rejected(format!("corrupt archive record {}: {}", archive_id, e)))
    }

    /// Ids of sessions that were initiated but neither completed nor aborted.
    pub fn pending_uploads(&self, vault: &str) -> Result<Vec<String>, RemoteError> {
        let uploads = self.vault_dir(vault)?.join("uploads");
        let entries = match fs::read_dir(&uploads) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.path().join(SESSION_FILE).is_file() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn new_id(&self, parts: &[&str]) -> String {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(&self.sequence.fetch_add(1, Ordering::Relaxed).to_le_bytes());
        hasher.update(Utc::now().to_rfc3339().as_bytes());
        hasher.finalize().to_hex().as_str()[..32].to_string()
    }

    fn stored_parts(dir: &Path) -> Result<Vec<(ByteRange, PathBuf)>, RemoteError> {
        let mut parts = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PART_EXTENSION) {
                continue;
            }
            let Some(range) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(parse_part_name)
            else {
                warn!(path = %path.display(), "Ignoring unrecognised part file");
                continue;
            };
            parts.push((range, path));
        }
        parts.sort_by_key(|(range, _)| range.start);
        Ok(parts)
    }
}

fn part_name(range: ByteRange) -> String {
    format!("{:020}-{:020}.{}", range.start, range.end, PART_EXTENSION)
}

fn parse_part_name(stem: &str) -> Option<ByteRange> {
    let (start, end) = stem.split_once('-')?;
    let range = ByteRange {
        start: start.parse().ok()?,
        end: end.parse().ok()?,
    };
    (range.end >= range.start).then_some(range)
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp, path)
}

impl ArchiveService for LocalVault {
    fn initiate_upload(
        &self,
        vault: &str,
        description: &str,
        part_size: u64,
    ) -> Result<String, RemoteError> {
        if part_size == 0 {
            return Err(RemoteError::Rejected("part size must be non-zero".to_string()));
        }
        let upload_id = self.new_id(&[vault, description]);
        let dir = self.session_dir(vault, &upload_id)?;
        fs::create_dir_all(&dir)?;

        let session = UploadSessionRecord {
            upload_id: upload_id.clone(),
            vault: vault.to_string(),
            description: description.to_string(),
            part_size,
            created_at: Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_vec_pretty(&session)
            .map_err(|e| RemoteError::Rejected(e.to_string()))?;
        write_atomic(&dir.join(SESSION_FILE), &json)?;

        debug!(vault, upload_id = %upload_id, part_size, "Opened upload session");
        Ok(upload_id)
    }

    fn upload_part(
        &self,
        upload_id: &str,
        vault: &str,
        range: ByteRange,
        checksum: &str,
        data: &[u8],
    ) -> Result<String, RemoteError> {
        let (dir, session) = self.load_session(vault, upload_id)?;

        if data.len() as u64 != range.len() {
            return Err(RemoteError::Rejected(format!(
                "range {} covers {} bytes but {} were sent",
                range,
                range.len(),
                data.len()
            )));
        }
        if range.start % session.part_size != 0 || range.len() > session.part_size {
            return Err(RemoteError::Rejected(format!(
                "range {} does not fit part size {}",
                range, session.part_size
            )));
        }

        let computed = hash_bytes::<Sha256>(data, TREE_HASH_BLOCK_SIZE).to_hex();
        if !computed.eq_ignore_ascii_case(checksum) {
            return Err(RemoteError::Rejected(format!(
                "checksum {} does not match part {} ({})",
                checksum, range, computed
            )));
        }

        write_atomic(&dir.join(part_name(range)), data)?;
        Ok(computed)
    }

    fn complete_upload(
        &self,
        upload_id: &str,
        vault: &str,
        archive_size: u64,
        checksum: &str,
    ) -> Result<ArchiveReceipt, RemoteError> {
        let (dir, session) = self.load_session(vault, upload_id)?;

        let parts = Self::stored_parts(&dir)?;
        let mut expected = 0u64;
        for (range, _) in &parts {
            if range.start != expected {
                return Err(RemoteError::Rejected(format!(
                    "missing data before part {}",
                    range
                )));
            }
            expected = range.end + 1;
        }
        if expected != archive_size {
            return Err(RemoteError::Rejected(format!(
                "parts cover {} bytes, archive size is {}",
                expected, archive_size
            )));
        }

        let archive_id = self.new_id(&[upload_id, checksum]);
        let archive_path = self.archive_path(vault, &archive_id)?;
        if let Some(parent) = archive_path.parent() {
            fs::create_dir_all(parent)?;
        }
        {
            let mut archive = File::create(&archive_path)?;
            for (_, path) in &parts {
                io::copy(&mut File::open(path)?, &mut archive)?;
            }
            archive.sync_all()?;
        }

        let reader = ChunkReader::new(File::open(&archive_path)?, TREE_HASH_BLOCK_SIZE)?;
        let computed = hash_reader::<Sha256, _>(&reader)?.to_hex();
        if !computed.eq_ignore_ascii_case(checksum) {
            fs::remove_file(&archive_path)?;
            return Err(RemoteError::Rejected(format!(
                "archive checksum {} does not match assembled data ({})",
                checksum, computed
            )));
        }

        let record = ArchiveRecord {
            archive_id: archive_id.clone(),
            description: session.description,
            size: archive_size,
            checksum: computed.clone(),
            created_at: Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| RemoteError::Rejected(e.to_string()))?;
        write_atomic(&archive_path.with_extension("json"), &json)?;
        fs::remove_dir_all(&dir)?;

        info!(vault, archive_id = %archive_id, size = archive_size, "Stored archive");
        Ok(ArchiveReceipt {
            archive_id,
            checksum: computed,
        })
    }

    fn abort_upload(&self, upload_id: &str, vault: &str) -> Result<(), RemoteError> {
        let dir = self.session_dir(vault, upload_id)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!(vault, upload_id, "Discarded upload session");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(RemoteError::SessionNotFound(upload_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
