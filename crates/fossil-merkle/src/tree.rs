//! Common read interface of the tree engines

use fossil_types::Id32;

use crate::{error::TreeError, path::Path};

/// Read access shared by [`StaticTree`](crate::StaticTree) and
/// [`DynTree`](crate::DynTree).
///
/// For the same leaves both engines return the same root and the same paths.
pub trait Tree {
    /// Number of leaves.
    fn leaves_len(&self) -> usize;

    /// Root hash, `None` when the tree has no leaves.
    fn root(&self) -> Option<Id32>;

    /// Leaf at `index`.
    fn leaf(&self, index: usize) -> Result<Id32, TreeError>;

    /// Inclusion path of the leaf at `index`.
    fn path(&self, index: usize) -> Result<Path, TreeError>;
}
