//! coldstash: incremental backups to cold storage
//!
//! Detects changed directories with stored fingerprints, packs them into a
//! tarball and uploads it to a vault in concurrent parts verified by SHA-256
//! tree hashes.

pub mod backup;
pub mod chunk;
pub mod concurrency;
pub mod config;
pub mod diff;
pub mod error;
pub mod logging;
pub mod package;
pub mod tooling;
pub mod tree;
pub mod types;
pub mod upload;
