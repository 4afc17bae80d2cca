//! SHA-256 hasher for Merkle nodes

use fossil_types::Id32;
use sha2::{Digest, Sha256};

/// SHA-256 hasher
#[derive(Debug, Clone, Copy)]
pub struct Sha256Hasher;

impl Sha256Hasher {
    /// Hash two nodes together: `SHA256(left || right)`, no domain separation.
    pub fn hash_pair(left: &Id32, right: &Id32) -> Id32 {
        let mut hasher = Sha256::new();
        hasher.update(left.as_bytes());
        hasher.update(right.as_bytes());
        Id32::new(hasher.finalize().into())
    }

    /// Hash arbitrary data
    pub fn hash(data: &[u8]) -> Id32 {
        Id32::new(Sha256::digest(data).into())
    }
}
