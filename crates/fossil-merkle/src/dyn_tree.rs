//! Merkle tree that grows by append and supports in-place leaf updates
//!
//! Nodes live in an arena and reference each other by index. Appending a leaf
//! finds the highest complete subtree ending at the previous last leaf and
//! pairs it with the new leaf under a fresh node, which takes the subtree's
//! slot. The resulting shape, and therefore every hash and path, matches
//! [`StaticTree`](crate::StaticTree) for the same leaves.

use fossil_types::Id32;
use parking_lot::RwLock;

use crate::{
    error::TreeError,
    hasher::Sha256Hasher,
    path::{Path, Triplet},
    tree::Tree,
};

#[derive(Debug, Clone)]
struct Node {
    hash: Id32,
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
    /// 0 for leaves.
    height: u32,
}

impl Node {
    const fn leaf(hash: Id32) -> Self {
        Self { hash, parent: None, left: None, right: None, height: 0 }
    }
}

#[derive(Debug, Default)]
struct State {
    nodes: Vec<Node>,
    /// Arena index of each leaf, in insertion order.
    leaves: Vec<usize>,
    root: Option<usize>,
    paused: bool,
}

impl State {
    fn append(&mut self, hash: Id32) {
        let new = self.nodes.len();
        self.nodes.push(Node::leaf(hash));
        self.leaves.push(new);

        let Some(&last) = self.leaves.iter().rev().nth(1) else {
            self.root = Some(new);
            return;
        };

        // 1. Climb to the highest complete subtree ending at the previous leaf.
        let mut left = last;
        while let Some(parent) = self.nodes[left].parent {
            if self.nodes[parent].height != self.nodes[left].height + 1 {
                break;
            }
            left = parent;
        }

        // 2. A new node takes its slot, with the subtree on the left.
        let grand = self.nodes[left].parent;
        let node = self.nodes.len();
        self.nodes.push(Node {
            hash: self.nodes[left].hash,
            parent: grand,
            left: Some(left),
            right: Some(new),
            height: self.nodes[left].height + 1,
        });
        self.nodes[left].parent = Some(node);
        self.nodes[new].parent = Some(node);

        match grand {
            Some(grand) => self.nodes[grand].right = Some(node),
            None => self.root = Some(node),
        }

        // 3. Re-hash up to the root.
        if !self.paused {
            self.rehash_up(node);
        }
    }

    fn update(&mut self, index: usize, hash: Id32) -> Result<(), TreeError> {
        let leaf = self.leaf_node(index)?;
        self.nodes[leaf].hash = hash;
        if let (false, Some(parent)) = (self.paused, self.nodes[leaf].parent) {
            self.rehash_up(parent);
        }
        Ok(())
    }

    fn rehash_up(&mut self, from: usize) {
        let mut current = Some(from);
        while let Some(index) = current {
            self.rehash(index);
            current = self.nodes[index].parent;
        }
    }

    fn rehash(&mut self, index: usize) {
        let node = &self.nodes[index];
        let hash = match (node.left, node.right) {
            (Some(l), Some(r)) => Sha256Hasher::hash_pair(&self.nodes[l].hash, &self.nodes[r].hash),
            (Some(only), None) | (None, Some(only)) => self.nodes[only].hash,
            (None, None) => return,
        };
        self.nodes[index].hash = hash;
    }

    /// Recompute every internal node, lowest first.
    fn rehash_all(&mut self) {
        let mut internal: Vec<usize> =
            (0..self.nodes.len()).filter(|&i| self.nodes[i].height > 0).collect();
        internal.sort_by_key(|&i| self.nodes[i].height);
        for index in internal {
            self.rehash(index);
        }
    }

    fn leaf_node(&self, index: usize) -> Result<usize, TreeError> {
        self.leaves
            .get(index)
            .copied()
            .ok_or(TreeError::IndexOutOfRange { index, len: self.leaves.len() })
    }

    fn path(&self, index: usize) -> Result<Path, TreeError> {
        let mut current = self.leaf_node(index)?;
        let mut triplets = Vec::new();
        while let Some(parent) = self.nodes[current].parent {
            let node = &self.nodes[parent];
            let hash_of = |child: Option<usize>| child.map_or(node.hash, |c| self.nodes[c].hash);
            triplets.push(Triplet {
                left: hash_of(node.left),
                right: hash_of(node.right),
                parent: node.hash,
            });
            current = parent;
        }
        Ok(Path::new(triplets))
    }
}

/// Incrementally built Merkle tree.
///
/// Mutations take a single writer lock; queries share a read lock, so a
/// `DynTree` can be queried from other threads while leaves are appended.
#[derive(Debug, Default)]
pub struct DynTree {
    state: RwLock<State>,
}

impl DynTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty tree with room for `leaves` leaves.
    pub fn with_capacity(leaves: usize) -> Self {
        let state = State {
            nodes: Vec::with_capacity((2 * leaves).saturating_sub(1)),
            leaves: Vec::with_capacity(leaves),
            ..State::default()
        };
        Self { state: RwLock::new(state) }
    }

    /// Build a tree holding `leaves`, hashing once at the end.
    pub fn from_leaves(leaves: &[Id32]) -> Self {
        let tree = Self::with_capacity(leaves.len());
        tree.extend(leaves.iter().copied());
        tree
    }

    /// Append a leaf and re-hash its ancestors.
    pub fn append(&self, leaf: Id32) {
        self.state.write().append(leaf);
    }

    /// Overwrite the leaf at `index` and re-hash its ancestors.
    pub fn update(&self, index: usize, leaf: Id32) -> Result<(), TreeError> {
        self.state.write().update(index, leaf)
    }

    /// Stop re-hashing on mutation.
    ///
    /// Until [`resume`](Self::resume), internal hashes, and so `root()` and
    /// `path()`, are stale.
    pub fn pause(&self) {
        self.state.write().paused = true;
    }

    /// Re-enable re-hashing and recompute every internal node.
    pub fn resume(&self) {
        let mut state = self.state.write();
        if state.paused {
            state.paused = false;
            state.rehash_all();
        }
    }

    /// Whether the tree is paused.
    pub fn is_paused(&self) -> bool {
        self.state.read().paused
    }

    /// Append many leaves under one lock, hashing once at the end.
    ///
    /// A paused tree stays paused and is not re-hashed.
    pub fn extend<I: IntoIterator<Item = Id32>>(&self, leaves: I) {
        let mut state = self.state.write();
        let was_paused = state.paused;
        state.paused = true;
        for leaf in leaves {
            state.append(leaf);
        }
        if !was_paused {
            state.paused = false;
            state.rehash_all();
        }
    }

    /// Number of leaves.
    pub fn leaves_len(&self) -> usize {
        self.state.read().leaves.len()
    }

    /// Whether the tree has no leaves.
    pub fn is_empty(&self) -> bool {
        self.leaves_len() == 0
    }

    /// Root hash, `None` when empty.
    pub fn root(&self) -> Option<Id32> {
        let state = self.state.read();
        state.root.map(|r| state.nodes[r].hash)
    }

    /// Leaf at `index`.
    pub fn leaf(&self, index: usize) -> Result<Id32, TreeError> {
        let state = self.state.read();
        state.leaf_node(index).map(|n| state.nodes[n].hash)
    }

    /// Inclusion path of the leaf at `index`, bottom up.
    pub fn path(&self, index: usize) -> Result<Path, TreeError> {
        self.state.read().path(index)
    }
}

impl Tree for DynTree {
    fn leaves_len(&self) -> usize {
        self.leaves_len()
    }

    fn root(&self) -> Option<Id32> {
        self.root()
    }

    fn leaf(&self, index: usize) -> Result<Id32, TreeError> {
        self.leaf(index)
    }

    fn path(&self, index: usize) -> Result<Path, TreeError> {
        self.path(index)
    }
}
