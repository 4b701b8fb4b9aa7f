use std::fs;

use coldstash::backup::{BackupRequest, BackupRunner};
use coldstash::config::BackupConfig;
use coldstash::package::{RunIndex, Tarball};
use coldstash::tree::{hash_reader, Sha256, TREE_HASH_BLOCK_SIZE};
use coldstash::chunk::ChunkReader;
use coldstash::upload::LocalVault;
use tempfile::TempDir;

use crate::source_tree;

fn local_config(temp: &TempDir) -> BackupConfig {
    let mut config = BackupConfig::default();
    config.vault.name = "nightly".to_string();
    config.vault.root = Some(temp.path().join("vaults"));
    config.upload.retry_delay_ms = 5;
    config
}

#[test]
fn full_run_archives_tarball_in_the_vault() {
    let temp = TempDir::new().unwrap();
    let root = source_tree(temp.path());
    let config = local_config(&temp);
    let vault = LocalVault::new(config.vault.resolved_root().unwrap());
    let tar = temp.path().join("run1.tar");

    let outcome = BackupRunner::new(&config, &vault)
        .run(&BackupRequest::new(vec![root], &tar))
        .unwrap();

    assert_eq!(
        outcome.entries,
        vec![".fingerprints", "readme.txt", "docs/report.txt", "docs/drafts/notes.txt"]
    );
    let receipt = outcome.receipt.clone().unwrap();
    assert!(outcome.checksum_verified);

    let local = hash_reader::<Sha256, _>(
        &ChunkReader::new(fs::File::open(&tar).unwrap(), TREE_HASH_BLOCK_SIZE).unwrap(),
    )
    .unwrap();
    assert_eq!(receipt.checksum, local.to_hex());

    let archived = fs::read(vault.archive_path("nightly", &receipt.archive_id).unwrap()).unwrap();
    assert_eq!(archived, fs::read(&tar).unwrap());

    let index = RunIndex::read(&temp.path().join("run1.tar.index")).unwrap();
    assert_eq!(index.archive_id.as_deref(), Some(receipt.archive_id.as_str()));
    assert_eq!(index.checksum.as_deref(), Some(receipt.checksum.as_str()));
    assert!(index.timestamp.is_some());
}

#[test]
fn incremental_run_packs_only_the_changed_directory() {
    let temp = TempDir::new().unwrap();
    let root = source_tree(temp.path());
    let meta = temp.path().join("meta");
    let config = local_config(&temp);
    let vault = LocalVault::new(config.vault.resolved_root().unwrap());
    let runner = BackupRunner::new(&config, &vault);

    let mut request = BackupRequest::new(vec![root.clone()], temp.path().join("full.tar"));
    request.metadata_dir = Some(meta.clone());
    runner.run(&request).unwrap();

    fs::write(root.join("docs/report.txt"), "revised quarterly numbers").unwrap();
    request.tarball = temp.path().join("incr.tar");
    let outcome = runner.run(&request).unwrap();

    assert_eq!(outcome.changed.len(), 2);
    assert_eq!(outcome.changed[0], root.join("docs"));
    assert!(outcome.entries.contains(&"docs/report.txt".to_string()));
    assert!(!outcome.entries.contains(&"readme.txt".to_string()));
    assert!(!outcome.entries.contains(&"docs/drafts/notes.txt".to_string()));
    assert!(meta.join("incr.tar.index").exists());
    assert!(!root.join(".fingerprints").exists());
}

#[test]
fn append_extends_an_existing_tarball() {
    let temp = TempDir::new().unwrap();
    let root = source_tree(temp.path());
    let config = local_config(&temp);
    let vault = LocalVault::new(config.vault.resolved_root().unwrap());
    let runner = BackupRunner::new(&config, &vault);
    let tar = temp.path().join("rolling.tar");

    let mut request = BackupRequest::new(vec![root.clone()], &tar);
    request.upload = false;
    let first = runner.run(&request).unwrap();

    fs::write(root.join("added.txt"), "new file").unwrap();
    request.append = true;
    let second = runner.run(&request).unwrap();

    let entries = Tarball::open(&tar).entries().unwrap();
    assert_eq!(entries, second.entries);
    assert!(entries.len() > first.entries.len());
    assert!(entries.contains(&"added.txt".to_string()));
    assert!(entries.contains(&"docs/drafts/notes.txt".to_string()));
}
