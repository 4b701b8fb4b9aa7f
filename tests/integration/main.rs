//! Integration tests for coldstash

mod backup_pipeline;
mod change_detection;
mod cli_commands;
mod multipart_upload;

use std::fs;
use std::path::{Path, PathBuf};

/// Deterministic, non-repeating test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 251) % 256) as u8).collect()
}

/// Source tree with a root file and one nested directory.
pub fn source_tree(base: &Path) -> PathBuf {
    let root = base.join("data");
    fs::create_dir_all(root.join("docs/drafts")).unwrap();
    fs::write(root.join("readme.txt"), "top level").unwrap();
    fs::write(root.join("docs/report.txt"), "quarterly numbers").unwrap();
    fs::write(root.join("docs/drafts/notes.txt"), "first draft").unwrap();
    root
}
