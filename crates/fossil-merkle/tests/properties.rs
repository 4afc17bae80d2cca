//! Property tests for the tree engines.

use fossil_merkle::{DynTree, Sha256Hasher, StaticTree};
use fossil_types::Id32;
use proptest::prelude::*;

fn leaves_strategy(max: usize) -> impl Strategy<Value = Vec<Id32>> {
    prop::collection::vec(any::<[u8; 32]>().prop_map(Id32::new), 1..max)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_engines_agree(leaves in leaves_strategy(80)) {
        let st = StaticTree::new(&leaves).unwrap();
        let dy = DynTree::new();
        for leaf in &leaves {
            dy.append(*leaf);
        }
        prop_assert_eq!(dy.root(), Some(st.root()));
        for i in 0..leaves.len() {
            prop_assert_eq!(dy.path(i).unwrap(), st.path(i).unwrap());
        }
        prop_assert_eq!(DynTree::from_leaves(&leaves).root(), Some(st.root()));
    }

    #[test]
    fn test_triplet_and_chain_laws(leaves in leaves_strategy(80)) {
        let tree = StaticTree::new(&leaves).unwrap();
        for (i, leaf) in leaves.iter().enumerate() {
            let path = tree.path(i).unwrap();
            for t in &path {
                prop_assert_eq!(t.parent, Sha256Hasher::hash_pair(&t.left, &t.right));
            }
            for pair in path.windows(2) {
                prop_assert!(pair[1].contains(&pair[0].parent));
            }
            prop_assert_eq!(path.root().unwrap_or(*leaf), tree.root());
            prop_assert!(path.len() < tree.depth().max(1));
        }
    }

    #[test]
    fn test_update_idempotence(
        leaves in leaves_strategy(40),
        index in any::<prop::sample::Index>(),
        other in any::<[u8; 32]>(),
    ) {
        let tree = DynTree::from_leaves(&leaves);
        let original = tree.root();
        let i = index.index(leaves.len());

        tree.update(i, leaves[i]).unwrap();
        prop_assert_eq!(tree.root(), original);

        tree.update(i, Id32::new(other)).unwrap();
        let mut changed = leaves.clone();
        changed[i] = Id32::new(other);
        prop_assert_eq!(tree.root(), Some(StaticTree::new(&changed).unwrap().root()));

        tree.update(i, leaves[i]).unwrap();
        prop_assert_eq!(tree.root(), original);
    }

    #[test]
    fn test_static_buffer_is_deterministic(leaves in leaves_strategy(50)) {
        let a = StaticTree::new(&leaves).unwrap();
        let b = StaticTree::new(&leaves).unwrap();
        prop_assert_eq!(a.nodes(), b.nodes());
        prop_assert_eq!(a.nodes().len(), 2 * leaves.len() - 1);
    }
}
