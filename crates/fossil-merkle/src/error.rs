//! Tree and path errors

use fossil_types::Id32;
use thiserror::Error;

/// Error returned by tree construction and queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    /// A static tree needs at least one leaf.
    #[error("cannot build a tree without leaves")]
    EmptyLeaves,
    /// Leaf index past the end of the tree.
    #[error("leaf index {index} out of range for {len} leaves")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of leaves in the tree.
        len: usize,
    },
}

/// Error returned when a [`Path`](crate::Path) fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid path at triplet {index}: {kind}")]
pub struct PathValidationError {
    /// Index of the offending triplet.
    pub index: usize,
    /// What went wrong.
    pub kind: PathErrorKind,
}

/// Kind of [`PathValidationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathErrorKind {
    /// The stored parent is not `SHA256(left || right)`.
    #[error("parent hash mismatch: computed {computed}, stored {stored}")]
    HashMismatch {
        /// Parent recomputed from the triplet.
        computed: Id32,
        /// Parent carried by the triplet.
        stored: Id32,
    },
    /// The triplet's parent is neither child of the next triplet.
    #[error("parent is not a child of the next triplet")]
    BrokenLink,
    /// The first triplet does not contain the leaf being proven.
    #[error("leaf {leaf} not found in first triplet")]
    LeafNotFound {
        /// Leaf that was expected.
        leaf: Id32,
    },
    /// The path ends somewhere other than the expected root.
    #[error("root mismatch: expected {expected}, got {actual}")]
    RootMismatch {
        /// Root the caller trusts.
        expected: Id32,
        /// Root the path leads to.
        actual: Id32,
    },
}
