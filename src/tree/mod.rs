//! Tree hashing: digest algorithms and pairwise Merkle folding.

pub mod digest;
pub mod hasher;

pub use digest::{Blake3, Sha256, TreeDigest, TreeHash, EMPTY_TREE_DIGEST};
pub use hasher::{fold_leaves, hash_blocks, hash_bytes, hash_reader, hash_text, TREE_HASH_BLOCK_SIZE};
