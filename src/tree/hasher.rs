//! Merkle tree-hash computation.
//!
//! Leaves are folded pairwise, front to back, level by level. An unpaired
//! node at the end of a level is carried up unchanged. This is the folding
//! used by the archive service, so part and archive checksums computed here
//! match the ones the service reports.

use super::digest::{TreeDigest, TreeHash};
use crate::chunk::ChunkReader;
use std::io::Read;

/// Block size for data tree hashes (1 MiB).
pub const TREE_HASH_BLOCK_SIZE: usize = 1024 * 1024;

/// Fold an ordered sequence of leaf hashes into a single root.
///
/// Zero leaves yields [`TreeHash::empty`]; a single leaf is returned as is.
pub fn fold_leaves<D: TreeDigest>(leaves: impl IntoIterator<Item = TreeHash>) -> TreeHash {
    let mut level: Vec<TreeHash> = leaves.into_iter().collect();

    while level.len() > 1 {
        let mut parents = Vec::with_capacity(level.len().div_ceil(2));
        let mut nodes = level.into_iter();
        while let Some(left) = nodes.next() {
            match nodes.next() {
                Some(right) => {
                    let mut pair = Vec::with_capacity(left.as_bytes().len() + right.as_bytes().len());
                    pair.extend_from_slice(left.as_bytes());
                    pair.extend_from_slice(right.as_bytes());
                    parents.push(D::digest(&pair));
                }
                None => parents.push(left),
            }
        }
        level = parents;
    }

    level.pop().unwrap_or_else(TreeHash::empty)
}

/// Hash each block, then fold the block hashes.
pub fn hash_blocks<'a, D: TreeDigest>(blocks: impl IntoIterator<Item = &'a [u8]>) -> TreeHash {
    fold_leaves::<D>(blocks.into_iter().map(D::digest))
}

/// Tree hash of `data` split into `block_size` blocks.
pub fn hash_bytes<D: TreeDigest>(data: &[u8], block_size: usize) -> TreeHash {
    hash_blocks::<D>(data.chunks(block_size.max(1)))
}

/// Tree hash of everything remaining in `reader`, one leaf per chunk.
pub fn hash_reader<D: TreeDigest, R: Read>(reader: &ChunkReader<R>) -> std::io::Result<TreeHash> {
    let mut leaves = Vec::new();
    loop {
        let chunk = reader.read_chunk()?;
        if chunk.is_empty() {
            break;
        }
        leaves.push(D::digest(chunk.data()));
    }
    Ok(fold_leaves::<D>(leaves))
}

/// Hex digest of a single text block.
pub fn hash_text<D: TreeDigest>(text: &str) -> String {
    hash_blocks::<D>([text.as_bytes()]).to_hex()
}
