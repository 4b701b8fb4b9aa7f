//! Tar packaging of a change set.
//!
//! Directories contribute their direct regular files, plain file paths are
//! added as they are, and the tarball never packs itself. Entry names are
//! relative to the backup root.

use crate::error::BackupError;
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use tracing::{debug, info, warn};

const BLOCK_SIZE: u64 = 512;

/// A tar file on disk.
#[derive(Debug, Clone)]
pub struct Tarball {
    path: PathBuf,
}

impl Tarball {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Write `paths` into the tarball at `path`.
    ///
    /// With `append` set and the file present, new entries follow the
    /// existing ones; otherwise the file is created or truncated.
    pub fn create(
        path: impl Into<PathBuf>,
        root: &Path,
        paths: &[PathBuf],
        append: bool,
    ) -> Result<Self, BackupError> {
        let tarball = Self::open(path);

        let file = if append && tarball.path.exists() {
            let end = tarball.end_of_entries()?;
            let mut file = OpenOptions::new().read(true).write(true).open(&tarball.path)?;
            file.set_len(end)?;
            file.seek(SeekFrom::Start(end))?;
            debug!(path = %tarball.path.display(), offset = end, "Appending to existing tarball");
            file
        } else {
            File::create(&tarball.path)?
        };

        let own_path = dunce::canonicalize(&tarball.path)?;
        let mut builder = Builder::new(file);
        builder.follow_symlinks(false);

        // A plain path may also be a direct child of a listed directory.
        let mut seen = HashSet::new();
        let mut added = 0usize;
        for path in paths {
            let files = if path.is_dir() {
                direct_files(path)?
            } else {
                vec![path.clone()]
            };
            for file in files {
                let key = dunce::canonicalize(&file).unwrap_or_else(|_| file.clone());
                if seen.insert(key) {
                    added += tarball.add_file(&mut builder, &file, root, &own_path) as usize;
                }
            }
        }

        builder
            .into_inner()
            .map_err(|e| BackupError::Packaging(format!("unable to finish tarball: {}", e)))?
            .sync_all()?;

        info!(path = %tarball.path.display(), added, "Created archive: {}", tarball);
        Ok(tarball)
    }

    fn add_file(&self, builder: &mut Builder<File>, file: &Path, root: &Path, own_path: &Path) -> bool {
        if dunce::canonicalize(file).is_ok_and(|p| p == own_path) {
            debug!(path = %file.display(), "Not adding tarball to itself, skipping");
            return false;
        }
        if !file.is_file() {
            return false;
        }

        let name = entry_name(file, root);
        match builder.append_path_with_name(file, &name) {
            Ok(()) => {
                debug!(path = %file.display(), entry = %name.display(), "Added entry");
                true
            }
            Err(e) => {
                warn!(path = %file.display(), error = %e, "Unable to add file to tarball");
                false
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of the regular-file entries, in archive order.
    pub fn entries(&self) -> Result<Vec<String>, BackupError> {
        let mut archive = Archive::new(File::open(&self.path)?);
        let mut names = Vec::new();
        for entry in archive.entries()? {
            let entry = entry?;
            if entry.header().entry_type().is_file() {
                names.push(entry.path()?.to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    pub fn entry_count(&self) -> usize {
        match self.entries() {
            Ok(entries) => entries.len(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Error counting tarball entries");
                0
            }
        }
    }

    /// Byte offset just past the last entry's data, before the end-of-archive
    /// marker.
    fn end_of_entries(&self) -> Result<u64, BackupError> {
        let mut archive = Archive::new(File::open(&self.path)?);
        let mut end = 0u64;
        for entry in archive.entries()? {
            let entry = entry?;
            let padded = entry.size().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
            end = entry.raw_file_position() + padded;
        }
        Ok(end)
    }
}

impl fmt::Display for Tarball {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());
        write!(f, "{} ({} entries)", name, self.entry_count())
    }
}

fn direct_files(dir: &Path) -> Result<Vec<PathBuf>, BackupError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Entry name for `file`: relative to `root` when inside it, else the bare
/// file name (tar entries cannot be absolute).
fn entry_name(file: &Path, root: &Path) -> PathBuf {
    if let Ok(relative) = file.strip_prefix(root) {
        if !relative.as_os_str().is_empty() {
            return relative.to_path_buf();
        }
    }
    file.file_name().map(PathBuf::from).unwrap_or_else(|| file.to_path_buf())
}
