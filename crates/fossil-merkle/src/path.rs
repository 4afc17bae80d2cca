//! Inclusion paths as chains of hash triplets

use std::ops::Deref;

use fossil_types::Id32;
use serde::{Deserialize, Serialize};

use crate::{
    error::{PathErrorKind, PathValidationError},
    hasher::Sha256Hasher,
};

/// One step of an inclusion path: two siblings and their parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triplet {
    /// Left child.
    pub left: Id32,
    /// Right child.
    pub right: Id32,
    /// `SHA256(left || right)`.
    pub parent: Id32,
}

impl Triplet {
    /// Build a triplet, computing the parent.
    pub fn new(left: Id32, right: Id32) -> Self {
        Self { left, right, parent: Sha256Hasher::hash_pair(&left, &right) }
    }

    /// Whether `hash` is one of the two children.
    pub fn contains(&self, hash: &Id32) -> bool {
        self.left == *hash || self.right == *hash
    }

    /// Recompute the parent and compare it with the stored one.
    pub fn validate(&self) -> Result<(), PathErrorKind> {
        let computed = Sha256Hasher::hash_pair(&self.left, &self.right);
        if computed == self.parent {
            Ok(())
        } else {
            Err(PathErrorKind::HashMismatch { computed, stored: self.parent })
        }
    }
}

/// Ordered triplets from the leaf level (index 0) to the root level (last).
///
/// An empty path proves a single-leaf tree, whose root is the leaf itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<Triplet>);

impl Path {
    /// Wrap a list of triplets. No validation is performed.
    pub const fn new(triplets: Vec<Triplet>) -> Self {
        Self(triplets)
    }

    /// Consume the path.
    pub fn into_inner(self) -> Vec<Triplet> {
        self.0
    }

    /// Root the path leads to, `None` for the empty path.
    pub fn root(&self) -> Option<Id32> {
        self.0.last().map(|t| t.parent)
    }

    /// Check every triplet's hash, then every link between adjacent triplets.
    pub fn validate(&self) -> Result<(), PathValidationError> {
        for (index, triplet) in self.0.iter().enumerate() {
            triplet.validate().map_err(|kind| PathValidationError { index, kind })?;
        }

        for (index, pair) in self.0.windows(2).enumerate() {
            if !pair[1].contains(&pair[0].parent) {
                return Err(PathValidationError { index, kind: PathErrorKind::BrokenLink });
            }
        }

        Ok(())
    }

    /// Validate the path and check that it proves `leaf` under `root`.
    pub fn verify_inclusion(&self, leaf: &Id32, root: &Id32) -> Result<(), PathValidationError> {
        self.validate()?;

        let Some(first) = self.0.first() else {
            if leaf == root {
                return Ok(());
            }
            return Err(PathValidationError {
                index: 0,
                kind: PathErrorKind::RootMismatch { expected: *root, actual: *leaf },
            });
        };

        if !first.contains(leaf) {
            return Err(PathValidationError {
                index: 0,
                kind: PathErrorKind::LeafNotFound { leaf: *leaf },
            });
        }

        let actual = self.root().unwrap_or(*leaf);
        if actual != *root {
            return Err(PathValidationError {
                index: self.0.len() - 1,
                kind: PathErrorKind::RootMismatch { expected: *root, actual },
            });
        }

        Ok(())
    }
}

impl Deref for Path {
    type Target = [Triplet];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Triplet>> for Path {
    fn from(triplets: Vec<Triplet>) -> Self {
        Self(triplets)
    }
}

impl FromIterator<Triplet> for Path {
    fn from_iter<I: IntoIterator<Item = Triplet>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Triplet;
    type IntoIter = std::slice::Iter<'a, Triplet>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Path {
    type Item = Triplet;
    type IntoIter = std::vec::IntoIter<Triplet>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
