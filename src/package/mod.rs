//! Archive packaging and the per-run index.

pub mod index;
pub mod tarball;

pub use index::{index_path, RunIndex};
pub use tarball::Tarball;
