//! SHA-256 Merkle trees for batch fossilization
//!
//! Two engines with identical hashing and path format:
//! - [`StaticTree`]: built once from a leaf vector, single buffer, O(n) build
//! - [`DynTree`]: grows by append, supports leaf updates and bulk appends
//!
//! Odd rows promote their last node unchanged (an "orphan") instead of
//! duplicating it. Inclusion proofs are [`Path`]s of `{left, right, parent}`
//! [`Triplet`]s that can be validated without the tree.

mod dyn_tree;
mod error;
mod hasher;
mod path;
mod static_tree;
mod tree;

pub use dyn_tree::DynTree;
pub use error::{PathErrorKind, PathValidationError, TreeError};
pub use hasher::Sha256Hasher;
pub use path::{Path, Triplet};
pub use static_tree::{row_lengths, StaticTree};
pub use tree::Tree;

#[cfg(test)]
mod tests {
    use super::*;
    use fossil_types::Id32;

    fn check<T: Tree>(tree: &T, leaves: &[Id32]) {
        assert_eq!(tree.leaves_len(), leaves.len());
        for (i, leaf) in leaves.iter().enumerate() {
            assert_eq!(tree.leaf(i), Ok(*leaf));
            let path = tree.path(i).unwrap();
            assert_eq!(path.root().unwrap_or(*leaf), tree.root().unwrap());
        }
    }

    #[test]
    fn test_both_engines_through_trait() {
        let leaves: Vec<Id32> = (0u8..11).map(|i| Sha256Hasher::hash(&[i])).collect();
        check(&StaticTree::new(&leaves).unwrap(), &leaves);
        check(&DynTree::from_leaves(&leaves), &leaves);
    }
}
