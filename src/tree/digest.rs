//! Digest algorithms and the raw digest value folded by the tree hasher.

use sha2::Digest as _;
use std::fmt;

/// Digest of a zero-leaf tree.
pub const EMPTY_TREE_DIGEST: [u8; 1] = [0x00];

/// Raw digest bytes produced by a [`TreeDigest`] algorithm.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TreeHash(Vec<u8>);

impl TreeHash {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The sentinel digest of an empty tree.
    pub fn empty() -> Self {
        Self(EMPTY_TREE_DIGEST.to_vec())
    }

    /// Parse a hex-encoded digest.
    pub fn from_hex(text: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(text).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl AsRef<[u8]> for TreeHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for TreeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeHash({})", self.to_hex())
    }
}

impl fmt::Display for TreeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A hash function usable for leaves and interior nodes of a tree hash.
pub trait TreeDigest {
    /// Hash a single block of bytes.
    fn digest(data: &[u8]) -> TreeHash;
}

/// SHA-256: integrity tree hashes exchanged with the archive service.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256;

impl TreeDigest for Sha256 {
    fn digest(data: &[u8]) -> TreeHash {
        TreeHash(sha2::Sha256::digest(data).to_vec())
    }
}

/// BLAKE3: fast local fingerprints for change detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3;

impl TreeDigest for Blake3 {
    fn digest(data: &[u8]) -> TreeHash {
        TreeHash(blake3::hash(data).as_bytes().to_vec())
    }
}
