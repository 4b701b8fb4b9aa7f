use std::fs;
use std::time::Duration;

use coldstash::error::{BackupError, RemoteError};
use coldstash::tree::{hash_bytes, Sha256, TREE_HASH_BLOCK_SIZE};
use coldstash::types::ByteRange;
use coldstash::upload::{
    ArchiveService, LocalVault, MultipartUpload, RetryPolicy, UploadSettings, UploadState, MIB,
};
use tempfile::TempDir;

use crate::payload;

const VAULT: &str = "photos";

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_millis(5),
    }
}

#[test]
fn multi_part_upload_assembles_identical_archive() {
    let temp = TempDir::new().unwrap();
    let data = payload((3 * MIB + MIB / 2) as usize);
    let source = temp.path().join("backup.tar");
    fs::write(&source, &data).unwrap();
    let vault = LocalVault::new(temp.path().join("vaults"));

    let mut job = MultipartUpload::new(&vault, &source, VAULT, UploadSettings::new(MIB, 3))
        .with_description("nightly")
        .with_retry(fast_retry())
        .with_wait(Duration::from_millis(1), Duration::from_millis(10));
    let receipt = job.run().unwrap();

    let expected = hash_bytes::<Sha256>(&data, TREE_HASH_BLOCK_SIZE);
    assert_eq!(job.state(), UploadState::Completed);
    assert_eq!(receipt.checksum, expected.to_hex());
    assert!(job.checksum_verified());
    assert_eq!(job.parts().len(), 4);
    assert_eq!(job.uploaded_bytes(), data.len() as u64);

    let archived = fs::read(vault.archive_path(VAULT, &receipt.archive_id).unwrap()).unwrap();
    assert_eq!(archived, data);

    let record = vault.archive_record(VAULT, &receipt.archive_id).unwrap();
    assert_eq!(record.description, "nightly");
    assert_eq!(record.size, data.len() as u64);
    assert!(vault.pending_uploads(VAULT).unwrap().is_empty());
}

#[test]
fn two_mib_parts_fold_to_whole_file_hash() {
    let temp = TempDir::new().unwrap();
    let data = payload((5 * MIB + 17) as usize);
    let source = temp.path().join("big.bin");
    fs::write(&source, &data).unwrap();
    let vault = LocalVault::new(temp.path().join("vaults"));

    let mut job = MultipartUpload::new(&vault, &source, VAULT, UploadSettings::new(2 * MIB, 2))
        .with_retry(fast_retry());
    let receipt = job.run().unwrap();

    assert_eq!(job.parts().len(), 3);
    assert_eq!(
        receipt.checksum,
        hash_bytes::<Sha256>(&data, TREE_HASH_BLOCK_SIZE).to_hex()
    );
}

#[test]
fn empty_file_uploads_as_empty_archive() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("empty.tar");
    fs::write(&source, b"").unwrap();
    let vault = LocalVault::new(temp.path().join("vaults"));

    let mut job = MultipartUpload::new(&vault, &source, VAULT, UploadSettings::new(MIB, 2))
        .with_retry(fast_retry());
    let receipt = job.run().unwrap();

    assert_eq!(receipt.checksum, "00");
    assert!(job.parts().is_empty());
    let archived = fs::read(vault.archive_path(VAULT, &receipt.archive_id).unwrap()).unwrap();
    assert!(archived.is_empty());
}

#[test]
fn missing_source_aborts_the_session() {
    let temp = TempDir::new().unwrap();
    let vault = LocalVault::new(temp.path().join("vaults"));

    let mut job = MultipartUpload::new(
        &vault,
        temp.path().join("absent.tar"),
        VAULT,
        UploadSettings::new(MIB, 2),
    );

    assert!(job.run().is_err());
    assert_eq!(job.state(), UploadState::Aborted);
    assert!(vault.pending_uploads(VAULT).unwrap().is_empty());
}

#[test]
fn vault_rejects_part_with_wrong_checksum() {
    let temp = TempDir::new().unwrap();
    let vault = LocalVault::new(temp.path().join("vaults"));
    let data = payload(1000);

    let upload_id = vault.initiate_upload(VAULT, "manual", MIB).unwrap();
    let wrong = hash_bytes::<Sha256>(b"something else", TREE_HASH_BLOCK_SIZE).to_hex();
    let result = vault.upload_part(&upload_id, VAULT, ByteRange::from_offset(0, 1000), &wrong, &data);

    assert!(matches!(result, Err(RemoteError::Rejected(_))));
}

#[test]
fn vault_rejects_completion_with_wrong_archive_checksum() {
    let temp = TempDir::new().unwrap();
    let vault = LocalVault::new(temp.path().join("vaults"));
    let data = payload(1000);
    let checksum = hash_bytes::<Sha256>(&data, TREE_HASH_BLOCK_SIZE).to_hex();

    let upload_id = vault.initiate_upload(VAULT, "manual", MIB).unwrap();
    vault
        .upload_part(&upload_id, VAULT, ByteRange::from_offset(0, 1000), &checksum, &data)
        .unwrap();
    let wrong = hash_bytes::<Sha256>(b"other", TREE_HASH_BLOCK_SIZE).to_hex();

    assert!(vault.complete_upload(&upload_id, VAULT, 1000, &wrong).is_err());
    assert_eq!(vault.pending_uploads(VAULT).unwrap(), vec![upload_id.clone()]);

    let receipt = vault.complete_upload(&upload_id, VAULT, 1000, &checksum).unwrap();
    assert_eq!(receipt.checksum, checksum);
}

#[test]
fn aborted_session_is_discarded() {
    let temp = TempDir::new().unwrap();
    let vault = LocalVault::new(temp.path().join("vaults"));

    let upload_id = vault.initiate_upload(VAULT, "manual", MIB).unwrap();
    vault.abort_upload(&upload_id, VAULT).unwrap();

    assert!(vault.pending_uploads(VAULT).unwrap().is_empty());
    assert!(matches!(
        vault.abort_upload(&upload_id, VAULT),
        Err(RemoteError::SessionNotFound(_))
    ));
}

#[test]
fn operations_out_of_order_are_refused() {
    let temp = TempDir::new().unwrap();
    let vault = LocalVault::new(temp.path().join("vaults"));
    let source = temp.path().join("file.bin");
    fs::write(&source, payload(10)).unwrap();

    let mut job = MultipartUpload::new(&vault, &source, VAULT, UploadSettings::new(MIB, 1));
    assert!(matches!(job.complete(), Err(BackupError::InvalidState { .. })));
    assert_eq!(job.state(), UploadState::New);
}
