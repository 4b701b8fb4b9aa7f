use std::fs;
use std::path::PathBuf;

use coldstash::config::BackupConfig;
use coldstash::tooling::cli::{CliContext, Commands};
use coldstash::tree::{hash_bytes, Sha256, TREE_HASH_BLOCK_SIZE};
use coldstash::upload::MIB;
use tempfile::TempDir;

use crate::{payload, source_tree};

fn context(temp: &TempDir) -> CliContext {
    let mut config = BackupConfig::default();
    config.vault.name = "cli".to_string();
    config.vault.root = Some(temp.path().join("vaults"));
    config.upload.retry_delay_ms = 5;
    CliContext::from_config(config).unwrap()
}

#[test]
fn backup_json_contract_has_required_fields() {
    let temp = TempDir::new().unwrap();
    let root = source_tree(temp.path());
    let cli = context(&temp);

    let output = cli
        .execute(&Commands::Backup {
            paths: vec![root, temp.path().join("out.tar")],
            meta: Some(temp.path().join("meta")),
            append: false,
            overwrite: false,
            no_upload: false,
            format: "json".to_string(),
        })
        .unwrap();

    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(parsed["changed"].as_array().unwrap().len(), 4);
    assert_eq!(parsed["entries"].as_array().unwrap().len(), 4);
    assert!(parsed["receipt"]["archive_id"].as_str().is_some());
    assert_eq!(parsed["checksum_verified"].as_bool(), Some(true));
    assert!(parsed["index"].as_str().unwrap().ends_with("out.tar.index"));
}

#[test]
fn backup_text_reports_no_changes_on_second_run() {
    let temp = TempDir::new().unwrap();
    let root = source_tree(temp.path());
    let cli = context(&temp);
    let command = |tar: &str| Commands::Backup {
        paths: vec![root.clone(), temp.path().join(tar)],
        meta: None,
        append: false,
        overwrite: false,
        no_upload: true,
        format: "text".to_string(),
    };

    let first = cli.execute(&command("one.tar")).unwrap();
    assert!(first.contains("Tarball:"));
    assert!(!first.contains("Archive ID:"));

    let second = cli.execute(&command("two.tar")).unwrap();
    assert_eq!(second, "No changes detected");
}

#[test]
fn changes_json_lists_changed_directories() {
    let temp = TempDir::new().unwrap();
    let root = source_tree(temp.path());
    let cli = context(&temp);
    let command = Commands::Changes {
        root: root.clone(),
        meta: None,
        format: "json".to_string(),
    };

    let first: serde_json::Value = serde_json::from_str(&cli.execute(&command).unwrap()).unwrap();
    assert_eq!(first["changed"].as_array().unwrap().len(), 3);
    assert!(first["store_file"].as_str().is_some());

    let second: serde_json::Value = serde_json::from_str(&cli.execute(&command).unwrap()).unwrap();
    assert!(second["changed"].as_array().unwrap().is_empty());
    assert!(second["store_file"].is_null());
}

#[test]
fn upload_json_reports_parts_and_checksum() {
    let temp = TempDir::new().unwrap();
    let data = payload((2 * MIB + 300) as usize);
    let file = temp.path().join("blob.bin");
    fs::write(&file, &data).unwrap();
    let cli = context(&temp);

    let output = cli
        .execute(&Commands::Upload {
            file,
            chunk_size: Some(MIB),
            workers: Some(2),
            description: Some("blob".to_string()),
            format: "json".to_string(),
        })
        .unwrap();

    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(parsed["vault"], "cli");
    assert_eq!(parsed["parts"].as_array().unwrap().len(), 3);
    assert_eq!(parsed["size"].as_u64(), Some(data.len() as u64));
    assert_eq!(
        parsed["checksum"].as_str().unwrap(),
        hash_bytes::<Sha256>(&data, TREE_HASH_BLOCK_SIZE).to_hex()
    );
    assert_eq!(parsed["verified"].as_bool(), Some(true));
}

#[test]
fn upload_text_renders_part_table() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("small.bin");
    fs::write(&file, payload(4096)).unwrap();
    let cli = context(&temp);

    let output = cli
        .execute(&Commands::Upload {
            file,
            chunk_size: None,
            workers: None,
            description: None,
            format: "text".to_string(),
        })
        .unwrap();

    assert!(output.contains("Archive ID:"));
    assert!(output.contains("Range"));
    assert!(output.contains("ok"));
}

#[test]
fn tree_hash_matches_library_hash() {
    let temp = TempDir::new().unwrap();
    let data = payload(3 * 1024 * 1024 + 5);
    let file = temp.path().join("data.bin");
    fs::write(&file, &data).unwrap();
    let cli = context(&temp);

    let output = cli
        .execute(&Commands::TreeHash {
            file: file.clone(),
            block_size: TREE_HASH_BLOCK_SIZE,
        })
        .unwrap();

    let expected = hash_bytes::<Sha256>(&data, TREE_HASH_BLOCK_SIZE).to_hex();
    assert_eq!(output, format!("{}  {}", expected, file.display()));
}

#[test]
fn tree_hash_rejects_zero_block_size() {
    let temp = TempDir::new().unwrap();
    let cli = context(&temp);
    assert!(cli
        .execute(&Commands::TreeHash {
            file: PathBuf::from("whatever"),
            block_size: 0,
        })
        .is_err());
}

#[test]
fn config_command_renders_toml() {
    let temp = TempDir::new().unwrap();
    let cli = context(&temp);

    let output = cli.execute(&Commands::Config).unwrap();
    let parsed: BackupConfig = toml::from_str(&output).unwrap();
    assert_eq!(&parsed, cli.config());
}

#[test]
fn invalid_format_is_rejected() {
    let temp = TempDir::new().unwrap();
    let root = source_tree(temp.path());
    let cli = context(&temp);

    assert!(cli
        .execute(&Commands::Changes {
            root,
            meta: None,
            format: "yaml".to_string(),
        })
        .is_err());
}
