//! Directory Fingerprint Store
//!
//! Persisted mapping of relative directory path to its last-known
//! fingerprint. The on-disk form is one `<path> <hash>` pair per line, with
//! the path percent-encoded so whitespace in directory names cannot split it.

use crate::error::BackupError;
use crate::types::Fingerprint;
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Fingerprint meaning "no content": never persisted.
pub const SENTINEL_FINGERPRINT: &str = "0";

/// File name of the persisted store.
pub const STORE_FILE_NAME: &str = ".fingerprints";

/// Mapping of relative path to fingerprint for one backup root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintStore {
    entries: BTreeMap<String, Fingerprint>,
}

impl FingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from `path`. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, BackupError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No fingerprint store found, starting empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self::parse(&contents, path))
    }

    fn parse(contents: &str, source: &Path) -> Self {
        let mut entries = BTreeMap::new();
        for (index, line) in contents.lines().enumerate() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.as_slice() {
                [rel_path, hash] => match urlencoding::decode(rel_path) {
                    Ok(rel_path) => {
                        entries.insert(rel_path.into_owned(), (*hash).to_string());
                    }
                    Err(e) => warn!(
                        path = %source.display(),
                        line = index + 1,
                        error = %e,
                        "Ignoring undecodable path in fingerprint store"
                    ),
                },
                _ => warn!(
                    path = %source.display(),
                    line = index + 1,
                    "Ignoring invalid line in fingerprint store"
                ),
            }
        }
        Self { entries }
    }

    /// Stored fingerprint, or the sentinel if `rel_path` is unknown.
    pub fn get(&self, rel_path: &str) -> &str {
        self.entries
            .get(rel_path)
            .map(String::as_str)
            .unwrap_or(SENTINEL_FINGERPRINT)
    }

    /// True iff the stored fingerprint differs from `fingerprint`.
    pub fn check_changed(&self, rel_path: &str, fingerprint: &str) -> bool {
        self.get(rel_path) != fingerprint
    }

    /// Stage a fingerprint. The sentinel is not stored.
    pub fn put(&mut self, rel_path: impl Into<String>, fingerprint: impl Into<Fingerprint>) {
        let fingerprint = fingerprint.into();
        if fingerprint != SENTINEL_FINGERPRINT {
            self.entries.insert(rel_path.into(), fingerprint);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Write the whole store to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<(), BackupError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            for (rel_path, fingerprint) in &self.entries {
                writeln!(file, "{} {}", urlencoding::encode(rel_path), fingerprint)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        debug!(path = %path.display(), entries = self.entries.len(), "Saved fingerprint store");
        Ok(())
    }
}
