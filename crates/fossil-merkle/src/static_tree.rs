//! Merkle tree over a fixed set of leaves
//!
//! All hashes live in a single buffer, top down. Given the tree
//!
//! ```text
//! 0        I
//!         / \
//! 1      H   \
//!       / \   \
//! 2    F   G   \
//!     / \ / \   \
//! 3   A B C D   E
//! ```
//!
//! the buffer holds `[I, H, F, G, A, B, C, D, E]` and the rows are
//! `[I]`, `[H]`, `[F, G]`, `[A, B, C, D, E]`. `E` is an orphan: it has no
//! sibling on its row and is promoted unchanged until it pairs with `H`.

use std::ops::Range;

use fossil_types::Id32;

use crate::{
    error::TreeError,
    hasher::Sha256Hasher,
    path::{Path, Triplet},
    tree::Tree,
};

/// Row/column coordinate; row 0 is the root.
type Pos = (usize, usize);

/// Immutable Merkle tree built in one pass from a leaf vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticTree {
    /// `2n - 1` hashes, root first, leaves last.
    buffer: Vec<Id32>,
    /// Buffer range of each row.
    rows: Vec<Range<usize>>,
}

impl StaticTree {
    /// Build a tree from `leaves`. Fails when `leaves` is empty.
    pub fn new(leaves: &[Id32]) -> Result<Self, TreeError> {
        if leaves.is_empty() {
            return Err(TreeError::EmptyLeaves);
        }

        let mut rows = Vec::new();
        let mut start = 0;
        for len in row_lengths(leaves.len()) {
            rows.push(start..start + len);
            start += len;
        }
        debug_assert_eq!(start, 2 * leaves.len() - 1);

        let mut buffer = vec![Id32::ZERO; start];
        let leaf_row = rows[rows.len() - 1].clone();
        buffer[leaf_row].copy_from_slice(leaves);

        let mut tree = Self { buffer, rows };
        tree.compute();
        Ok(tree)
    }

    /// Root hash.
    pub fn root(&self) -> Id32 {
        self.buffer[0]
    }

    /// Number of leaves.
    pub fn leaves_len(&self) -> usize {
        self.leaves().len()
    }

    /// Bottom row.
    pub fn leaves(&self) -> &[Id32] {
        self.row(self.depth() - 1).unwrap_or_default()
    }

    /// Leaf at `index`.
    pub fn leaf(&self, index: usize) -> Result<Id32, TreeError> {
        self.leaves()
            .get(index)
            .copied()
            .ok_or(TreeError::IndexOutOfRange { index, len: self.leaves_len() })
    }

    /// Inclusion path of the leaf at `index`, bottom up.
    pub fn path(&self, index: usize) -> Result<Path, TreeError> {
        let len = self.leaves_len();
        if index >= len {
            return Err(TreeError::IndexOutOfRange { index, len });
        }

        let mut triplets = Vec::with_capacity(self.depth() - 1);
        let mut pos = (self.depth() - 1, index);
        while let Some(parent) = self.parent(pos) {
            triplets.push(self.triplet(pos, parent));
            pos = parent;
        }
        Ok(Path::new(triplets))
    }

    /// Number of rows, root included.
    pub fn depth(&self) -> usize {
        self.rows.len()
    }

    /// Hashes of row `r` (0 is the root row).
    pub fn row(&self, r: usize) -> Option<&[Id32]> {
        self.rows.get(r).map(|range| &self.buffer[range.clone()])
    }

    /// Whole buffer, root first.
    pub fn nodes(&self) -> &[Id32] {
        &self.buffer
    }

    fn row_len(&self, r: usize) -> usize {
        self.rows[r].len()
    }

    fn get(&self, (r, c): Pos) -> Id32 {
        self.buffer[self.rows[r].start + c]
    }

    fn compute(&mut self) {
        for r in (0..self.depth() - 1).rev() {
            for c in 0..self.row_len(r) {
                let left = self.get(Self::left_child((r, c)));
                // Without a right child the left hash is promoted as is.
                let hash = match self.right_child((r, c)) {
                    Some(right) => Sha256Hasher::hash_pair(&left, &self.get(right)),
                    None => left,
                };
                let offset = self.rows[r].start + c;
                self.buffer[offset] = hash;
            }
        }
    }

    fn triplet(&self, pos: Pos, parent: Pos) -> Triplet {
        let (left, right) = if Self::left_child(parent) == pos {
            let right = self.right_child(parent).map_or(self.get(pos), |p| self.get(p));
            (self.get(pos), right)
        } else {
            (self.get(Self::left_child(parent)), self.get(pos))
        };
        Triplet { left, right, parent: self.get(parent) }
    }

    /// Nearest row above holding the parent; skips levels an orphan was
    /// promoted through.
    fn parent(&self, (r, c): Pos) -> Option<Pos> {
        let (mut r, mut c) = (r, c);
        while r > 0 {
            r -= 1;
            c /= 2;
            if c < self.row_len(r) {
                return Some((r, c));
            }
        }
        None
    }

    const fn left_child((r, c): Pos) -> Pos {
        (r + 1, c * 2)
    }

    fn right_child(&self, (r, c): Pos) -> Option<Pos> {
        let (mut r, mut c) = (r + 1, c * 2 + 1);
        while r < self.depth() {
            if c < self.row_len(r) {
                return Some((r, c));
            }
            // Orphan: keep descending along the left edge, no +1.
            r += 1;
            c *= 2;
        }
        None
    }
}

impl Tree for StaticTree {
    fn leaves_len(&self) -> usize {
        self.leaves_len()
    }

    fn root(&self) -> Option<Id32> {
        Some(self.root())
    }

    fn leaf(&self, index: usize) -> Result<Id32, TreeError> {
        self.leaf(index)
    }

    fn path(&self, index: usize) -> Result<Path, TreeError> {
        self.path(index)
    }
}

/// Row lengths, root row first, for `n >= 1` leaves.
///
/// The first odd row arms the orphan flag (its tail is promoted); the next
/// odd row pairs the orphan back in and clears it.
pub fn row_lengths(n: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }

    let depth = (usize::BITS - (n - 1).leading_zeros()) as usize + 1;
    let mut lengths = vec![0; depth];
    let mut curr = n;
    let mut orphan = false;

    for len in lengths.iter_mut().rev() {
        *len = curr;
        if curr % 2 == 1 {
            if orphan {
                curr += 1;
            }
            orphan = !orphan;
        }
        curr /= 2;
    }

    lengths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<Id32> {
        (0..n).map(|i| Sha256Hasher::hash(&[b'a' + i as u8])).collect()
    }

    #[test]
    fn test_row_lengths() {
        assert_eq!(row_lengths(1), vec![1]);
        assert_eq!(row_lengths(2), vec![1, 2]);
        assert_eq!(row_lengths(3), vec![1, 1, 3]);
        assert_eq!(row_lengths(5), vec![1, 1, 2, 5]);
        assert_eq!(row_lengths(6), vec![1, 1, 3, 6]);
        assert_eq!(row_lengths(7), vec![1, 2, 3, 7]);
        assert_eq!(row_lengths(9), vec![1, 1, 2, 4, 9]);
        for n in 1..200 {
            assert_eq!(row_lengths(n).iter().sum::<usize>(), 2 * n - 1, "n = {n}");
        }
    }

    #[test]
    fn test_empty_is_error() {
        assert_eq!(StaticTree::new(&[]), Err(TreeError::EmptyLeaves));
    }

    #[test]
    fn test_single_leaf() {
        let l = leaves(1);
        let tree = StaticTree::new(&l).unwrap();
        assert_eq!(tree.root(), l[0]);
        assert_eq!(tree.depth(), 1);
        assert!(tree.path(0).unwrap().is_empty());
    }

    #[test]
    fn test_buffer_layout() {
        let l = leaves(5);
        let tree = StaticTree::new(&l).unwrap();
        assert_eq!(tree.nodes().len(), 9);
        assert_eq!(tree.leaves(), &l[..]);
        assert_eq!(tree.row(2).unwrap()[0], Sha256Hasher::hash_pair(&l[0], &l[1]));
        // The orphan pairs with the row-1 node.
        let h = tree.row(1).unwrap()[0];
        assert_eq!(tree.root(), Sha256Hasher::hash_pair(&h, &l[4]));
        assert_eq!(tree.row(4), None);
    }

    #[test]
    fn test_out_of_range() {
        let tree = StaticTree::new(&leaves(3)).unwrap();
        assert_eq!(tree.leaf(3), Err(TreeError::IndexOutOfRange { index: 3, len: 3 }));
        assert_eq!(tree.path(7), Err(TreeError::IndexOutOfRange { index: 7, len: 3 }));
    }

    #[test]
    fn test_orphan_path_skips_levels() {
        let tree = StaticTree::new(&leaves(5)).unwrap();
        let path = tree.path(4).unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].right, tree.leaf(4).unwrap());
        assert_eq!(path[0].parent, tree.root());
        assert!(path.validate().is_ok());
    }

    #[test]
    fn test_same_leaves_same_buffer() {
        let l = leaves(7);
        assert_eq!(StaticTree::new(&l).unwrap().nodes(), StaticTree::new(&l).unwrap().nodes());
    }
}
