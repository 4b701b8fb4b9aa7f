//! Concurrent multipart upload to an archive service.

pub mod ledger;
pub mod local;
pub mod orchestrator;
pub mod policy;
pub mod service;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use ledger::{format_speed, PartLedger, PartRecord};
pub use local::LocalVault;
pub use orchestrator::{MultipartUpload, UploadState};
pub use policy::{RetryPolicy, UploadPolicy, UploadSettings, UploadTier, MIB};
pub use service::ArchiveService;
