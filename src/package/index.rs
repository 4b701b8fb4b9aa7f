//! Per-run index report.
//!
//! ```text
//! 2024-05-01T10:15:30.123
//! ArchiveId: <id>
//! Checksum: <hex>
//! ---
//! docs/a.txt
//! docs/b.txt
//! ```
//!
//! The archive lines are present only when an upload completed, the
//! separator and entry list only when the tarball has entries.

use crate::error::BackupError;
use chrono::{Local, NaiveDateTime};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";
const SEPARATOR: &str = "---";

/// File name of the index written for `tarball`: `<tarball name>.index`.
pub fn index_path(tarball: &Path, metadata_dir: Option<&Path>) -> PathBuf {
    let mut name = tarball
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".index");

    let dir = match metadata_dir {
        Some(dir) => dir.to_path_buf(),
        None => tarball
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    dir.join(name)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunIndex {
    pub timestamp: Option<NaiveDateTime>,
    pub archive_id: Option<String>,
    pub checksum: Option<String>,
    pub entries: Vec<String>,
}

impl RunIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_archive(mut self, archive_id: impl Into<String>, checksum: impl Into<String>) -> Self {
        self.archive_id = Some(archive_id.into());
        self.checksum = Some(checksum.into());
        self
    }

    pub fn with_entries(mut self, entries: Vec<String>) -> Self {
        self.entries = entries;
        self
    }

    /// Render the report, stamping it with the current local time if no
    /// timestamp was set.
    pub fn render(&self) -> String {
        let timestamp = self
            .timestamp
            .unwrap_or_else(|| Local::now().naive_local());

        let mut out = String::new();
        let _ = writeln!(out, "{}", timestamp.format(TIMESTAMP_FORMAT));
        if let Some(archive_id) = &self.archive_id {
            let _ = writeln!(out, "ArchiveId: {}", archive_id);
        }
        if let Some(checksum) = &self.checksum {
            let _ = writeln!(out, "Checksum: {}", checksum);
        }
        if !self.entries.is_empty() {
            let _ = writeln!(out, "{}", SEPARATOR);
            for entry in &self.entries {
                let _ = writeln!(out, "{}", entry);
            }
        }
        out
    }

    /// Write the report to `path`, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<(), BackupError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render())?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, BackupError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn parse(text: &str) -> Result<Self, BackupError> {
        let mut lines = text.lines();
        let first = lines
            .next()
            .ok_or_else(|| BackupError::Packaging("index is empty".to_string()))?;
        let timestamp = NaiveDateTime::parse_from_str(first, TIMESTAMP_FORMAT)
            .map_err(|e| BackupError::Packaging(format!("invalid index timestamp '{}': {}", first, e)))?;

        let mut index = Self {
            timestamp: Some(timestamp),
            ..Self::default()
        };
        let mut in_entries = false;
        for line in lines {
            if in_entries {
                index.entries.push(line.to_string());
            } else if line == SEPARATOR {
                in_entries = true;
            } else if let Some(id) = line.strip_prefix("ArchiveId: ") {
                index.archive_id = Some(id.to_string());
            } else if let Some(checksum) = line.strip_prefix("Checksum: ") {
                index.checksum = Some(checksum.to_string());
            } else {
                return Err(BackupError::Packaging(format!("unexpected index line '{}'", line)));
            }
        }
        Ok(index)
    }
}
