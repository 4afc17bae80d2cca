//! Per-leaf proof of fossilization

use fossil_merkle::{Path, PathValidationError};
use fossil_types::Id32;
use serde::{Deserialize, Serialize};

use crate::anchor::AnchorReceipt;

/// Everything a verifier needs to check that `leaf_hash` was anchored:
/// the batch root, the inclusion path to it and the anchor receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Submitted digest.
    pub leaf_hash: Id32,
    /// Batch the leaf was sealed in.
    pub batch_number: u64,
    /// Merkle root of the batch.
    pub root: Id32,
    /// Inclusion path from the leaf to `root`. Empty for a single-leaf batch.
    pub path: Path,
    /// Receipt returned by the anchor for `root`.
    pub receipt: AnchorReceipt,
}

impl Evidence {
    /// Check the path on its own, then that it links `leaf_hash` to `root`.
    ///
    /// This does not contact the anchor: checking `receipt` against the
    /// external trust root is up to the verifier.
    pub fn verify(&self) -> Result<(), PathValidationError> {
        self.path.verify_inclusion(&self.leaf_hash, &self.root)
    }

    /// Single-line JSON encoding.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A published result: the evidence of one leaf and the bytes submitted
/// with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fossil {
    /// Proof of inclusion and anchoring.
    pub evidence: Evidence,
    /// Opaque bytes given to [`submit_with_meta`](crate::Fossilizer::submit_with_meta).
    /// Empty for plain submissions and for leaves recovered from disk.
    pub meta: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fossil_merkle::{PathErrorKind, Sha256Hasher, StaticTree};

    fn evidence(n: usize, index: usize) -> Evidence {
        let leaves: Vec<Id32> = (0..n as u8).map(|i| Sha256Hasher::hash(&[i])).collect();
        let tree = StaticTree::new(&leaves).unwrap();
        Evidence {
            leaf_hash: leaves[index],
            batch_number: 4,
            root: tree.root(),
            path: tree.path(index).unwrap(),
            receipt: AnchorReceipt::new(vec![1, 2, 3]),
        }
    }

    #[test]
    fn test_verify_accepts_tree_paths() {
        for n in 1..8 {
            for i in 0..n {
                assert!(evidence(n, i).verify().is_ok(), "n = {n}, i = {i}");
            }
        }
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let mut ev = evidence(5, 2);
        ev.leaf_hash = Id32::new([0xee; 32]);
        assert!(matches!(ev.verify().unwrap_err().kind, PathErrorKind::LeafNotFound { .. }));

        let mut ev = evidence(5, 2);
        ev.root = Id32::ZERO;
        assert!(matches!(ev.verify().unwrap_err().kind, PathErrorKind::RootMismatch { .. }));

        let mut ev = evidence(1, 0);
        ev.root = Id32::ZERO;
        assert!(ev.verify().is_err());
    }

    #[test]
    fn test_json_fields() {
        let ev = evidence(3, 2);
        let value: serde_json::Value = serde_json::from_str(&ev.to_json().unwrap()).unwrap();
        assert_eq!(value["leaf_hash"], ev.leaf_hash.to_hex());
        assert_eq!(value["batch_number"], 4);
        assert_eq!(value["root"], ev.root.to_hex());
        assert_eq!(value["receipt"], "010203");
        assert_eq!(value["path"].as_array().unwrap().len(), 1);
        assert_eq!(value["path"][0]["right"], ev.leaf_hash.to_hex());

        let back: Evidence = serde_json::from_value(value).unwrap();
        assert_eq!(back, ev);
    }
}
