use std::fs;

use coldstash::diff::{
    ChangeDetector, FingerprintStore, ROOT_KEY, SENTINEL_FINGERPRINT, STORE_FILE_NAME,
};
use tempfile::TempDir;

use crate::source_tree;

#[test]
fn first_run_marks_every_directory_with_files() {
    let temp = TempDir::new().unwrap();
    let root = source_tree(temp.path());

    let changes = ChangeDetector::new(None).detect_changes(&root).unwrap();

    assert_eq!(changes.changed_dirs().len(), 3);
    assert_eq!(changes.changed_dirs()[0], root);
    assert_eq!(changes.store_file(), Some(root.join(STORE_FILE_NAME).as_path()));
    assert_eq!(changes.len(), 4);
}

#[test]
fn unchanged_tree_reports_nothing_on_second_run() {
    let temp = TempDir::new().unwrap();
    let root = source_tree(temp.path());
    let detector = ChangeDetector::new(None);

    detector.detect_changes(&root).unwrap();
    let second = detector.detect_changes(&root).unwrap();

    assert!(second.is_empty());
    assert!(second.store_file().is_none());
}

#[test]
fn modified_file_marks_only_its_directory() {
    let temp = TempDir::new().unwrap();
    let root = source_tree(temp.path());
    let detector = ChangeDetector::new(None);
    detector.detect_changes(&root).unwrap();

    fs::write(root.join("docs/drafts/notes.txt"), "second draft, a bit longer").unwrap();
    let changes = detector.detect_changes(&root).unwrap();

    assert_eq!(changes.changed_dirs(), &[root.join("docs/drafts")]);
}

#[test]
fn new_directory_is_reported() {
    let temp = TempDir::new().unwrap();
    let root = source_tree(temp.path());
    let detector = ChangeDetector::new(None);
    detector.detect_changes(&root).unwrap();

    fs::create_dir_all(root.join("photos")).unwrap();
    fs::write(root.join("photos/cat.jpg"), [0xFF, 0xD8, 0xFF]).unwrap();
    let changes = detector.detect_changes(&root).unwrap();

    assert_eq!(changes.changed_dirs(), &[root.join("photos")]);
}

#[test]
fn metadata_dir_keeps_store_out_of_the_source() {
    let temp = TempDir::new().unwrap();
    let root = source_tree(temp.path());
    let meta = temp.path().join("meta");
    let detector = ChangeDetector::new(Some(meta.clone()));

    let changes = detector.detect_changes(&root).unwrap();
    let store = changes.store_file().unwrap().to_path_buf();

    assert!(store.starts_with(&meta));
    assert!(!root.join(STORE_FILE_NAME).exists());

    let saved = FingerprintStore::load(&store).unwrap();
    assert_eq!(saved.len(), 3);
    assert_ne!(saved.get(ROOT_KEY), SENTINEL_FINGERPRINT);
    assert_ne!(saved.get("docs/drafts"), SENTINEL_FINGERPRINT);
}

#[test]
fn missing_root_is_rejected() {
    let temp = TempDir::new().unwrap();
    assert!(ChangeDetector::new(None)
        .detect_changes(&temp.path().join("absent"))
        .is_err());
}

#[test]
fn directory_names_with_spaces_are_stable_across_runs() {
    let temp = TempDir::new().unwrap();
    let root = source_tree(temp.path());
    fs::create_dir_all(root.join("My Documents/tax\treturns")).unwrap();
    fs::write(root.join("My Documents/a.txt"), "letter").unwrap();
    fs::write(root.join("My Documents/tax\treturns/2025.txt"), "numbers").unwrap();
    let detector = ChangeDetector::new(None);

    let first = detector.detect_changes(&root).unwrap();
    assert!(first.changed_dirs().contains(&root.join("My Documents")));

    let second = detector.detect_changes(&root).unwrap();
    assert!(second.is_empty(), "unchanged tree reported {:?}", second.changed_dirs());
}
