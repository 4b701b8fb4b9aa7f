//! Incremental change detection
//!
//! Each directory is summarised by a fingerprint built from the name, size
//! and modification time of the regular files directly inside it. A run
//! compares every directory's fingerprint with the one stored by the
//! previous run and reports the directories that differ.
//!
//! Only direct children contribute to a directory's fingerprint: a change
//! deep in a subtree marks the directory that holds the modified file, not
//! its ancestors.

pub mod fingerprint;

pub use fingerprint::{FingerprintStore, SENTINEL_FINGERPRINT, STORE_FILE_NAME};

use crate::error::BackupError;
use crate::tree::{hash_text, Blake3};
use crate::types::Fingerprint;
use std::ffi::OsStr;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Store key used for the backup root itself.
pub const ROOT_KEY: &str = ".";

/// Directories changed since the previous run for one backup root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changed_dirs: Vec<PathBuf>,
    store_file: Option<PathBuf>,
}

impl ChangeSet {
    /// Changed directories in walk order.
    pub fn changed_dirs(&self) -> &[PathBuf] {
        &self.changed_dirs
    }

    /// Fingerprint store to package with the changes, present iff something changed.
    pub fn store_file(&self) -> Option<&Path> {
        self.store_file.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.changed_dirs.is_empty()
    }

    /// Number of paths to package, including the store file.
    pub fn len(&self) -> usize {
        self.changed_dirs.len() + usize::from(self.store_file.is_some())
    }

    /// All paths to package: changed directories followed by the store file.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths = self.changed_dirs.clone();
        paths.extend(self.store_file.clone());
        paths
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        let mut paths = self.changed_dirs;
        paths.extend(self.store_file);
        paths
    }
}

/// Walks backup roots and reports changed directories.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    metadata_dir: Option<PathBuf>,
}

impl ChangeDetector {
    /// Create a detector. With a metadata directory, fingerprint stores are
    /// kept there instead of inside each backup root.
    pub fn new(metadata_dir: Option<PathBuf>) -> Self {
        Self { metadata_dir }
    }

    pub fn metadata_dir(&self) -> Option<&Path> {
        self.metadata_dir.as_deref()
    }

    /// Location of the fingerprint store for `root`.
    ///
    /// Under a metadata directory the canonical root path is mirrored as a
    /// directory structure, e.g. `/home/me/docs` maps to
    /// `<meta>/home/me/docs/.fingerprints`.
    pub fn store_path(&self, root: &Path) -> Result<PathBuf, BackupError> {
        let Some(meta) = &self.metadata_dir else {
            return Ok(root.join(STORE_FILE_NAME));
        };

        let canonical = dunce::canonicalize(root)?;
        let mut dir = meta.clone();
        for component in canonical.components() {
            if let Component::Normal(name) = component {
                dir.push(name);
            }
        }
        Ok(dir.join(STORE_FILE_NAME))
    }

    /// Detect the directories under `root` that changed since the last run,
    /// and persist the new fingerprints.
    pub fn detect_changes(&self, root: &Path) -> Result<ChangeSet, BackupError> {
        if !root.is_dir() {
            return Err(BackupError::InvalidArgument(format!(
                "Backup root must be an existing directory: {}",
                root.display()
            )));
        }

        let store_path = self.store_path(root)?;
        let previous = FingerprintStore::load(&store_path).unwrap_or_else(|e| {
            error!(path = %store_path.display(), error = %e, "Failed to load fingerprint store, treating every directory as changed");
            FingerprintStore::new()
        });
        let mut current = FingerprintStore::new();
        let mut changed_dirs = Vec::new();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            let dir = entry.path();
            let key = relative_key(root, dir);
            let fingerprint = match directory_fingerprint(dir) {
                Ok(fingerprint) => fingerprint,
                Err(e) => {
                    warn!(dir = %key, error = %e, "Unable to check directory for changes");
                    continue;
                }
            };

            if previous.check_changed(&key, &fingerprint) {
                debug!(dir = %key, "Directory changed");
                changed_dirs.push(dir.to_path_buf());
            }
            current.put(key, fingerprint);
        }

        if let Err(e) = current.save(&store_path) {
            error!(path = %store_path.display(), error = %e, "Failed to save fingerprint store");
        }

        let store_file = (!changed_dirs.is_empty()).then_some(store_path);
        info!(
            root = %root.display(),
            changed = changed_dirs.len(),
            tracked = current.len(),
            "Change detection complete"
        );

        Ok(ChangeSet {
            changed_dirs,
            store_file,
        })
    }
}

/// Fingerprint of a file or directory. Anything else maps to the sentinel.
pub fn fingerprint(path: &Path) -> io::Result<Fingerprint> {
    let metadata = fs::metadata(path)?;
    if metadata.is_file() {
        let name = path.file_name().unwrap_or_else(|| path.as_os_str());
        return Ok(hash_text::<Blake3>(&modification_string(name, &metadata)));
    }
    if metadata.is_dir() {
        return directory_fingerprint(path);
    }
    Ok(SENTINEL_FINGERPRINT.to_string())
}

/// Fingerprint of the regular files directly inside `dir`, in listing order.
pub fn directory_fingerprint(dir: &Path) -> io::Result<Fingerprint> {
    let mut listing = String::new();

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Ignoring unreadable directory entry");
                continue;
            }
        };
        let name = entry.file_name();
        if name == STORE_FILE_NAME {
            continue;
        }
        match fs::metadata(entry.path()) {
            Ok(metadata) if metadata.is_file() => {
                listing.push_str(&modification_string(&name, &metadata));
            }
            Ok(_) => {}
            Err(e) => warn!(path = %entry.path().display(), error = %e, "Ignoring file"),
        }
    }

    if listing.is_empty() {
        Ok(SENTINEL_FINGERPRINT.to_string())
    } else {
        Ok(hash_text::<Blake3>(&listing))
    }
}

fn modification_string(name: &OsStr, metadata: &Metadata) -> String {
    let modified_ms = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{}|{}|{}", name.to_string_lossy(), metadata.len(), modified_ms)
}

/// Store key for `dir`: `.` for the root, else a `/`-separated relative path.
fn relative_key(root: &Path, dir: &Path) -> String {
    let rel = dir.strip_prefix(root).unwrap_or(dir);
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        ROOT_KEY.to_string()
    } else {
        parts.join("/")
    }
}
