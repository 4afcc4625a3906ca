//! property tests: every witness verifies against the current root

use proptest::prelude::*;
use witness_merkle::{empty_root, MerkleMap};

const H: usize = 12;

fn writes() -> impl Strategy<Value = Vec<(u64, u128)>> {
    prop::collection::vec((0u64..(1 << H), 0u128..1_000_000), 1..40)
}

proptest! {
    #[test]
    fn witness_sound_after_every_write(ops in writes(), probe in 0u64..(1 << H)) {
        let mut map = MerkleMap::<H>::new();
        for (index, value) in ops {
            map.set_leaf(index, value).unwrap();

            let witness = map.witness_for(index).unwrap();
            prop_assert!(witness.verify(index, value, &map.root()));

            let probe_value = map.get(probe).unwrap();
            let probe_witness = map.witness_for(probe).unwrap();
            prop_assert!(probe_witness.verify(probe, probe_value, &map.root()));
        }
    }

    #[test]
    fn wrong_value_never_verifies(ops in writes(), delta in 1u128..1000) {
        let map = MerkleMap::<H>::from_leaves(ops.clone()).unwrap();
        let (index, _) = ops[0];
        let value = map.get(index).unwrap();
        let witness = map.witness_for(index).unwrap();
        prop_assert!(!witness.verify(index, value + delta, &map.root()));
    }

    #[test]
    fn clearing_everything_restores_empty_root(ops in writes()) {
        let mut map = MerkleMap::<H>::from_leaves(ops.clone()).unwrap();
        for (index, _) in ops {
            map.set_leaf(index, 0).unwrap();
        }
        prop_assert_eq!(map.root(), empty_root::<H>());
        prop_assert_eq!(map.node_count(), 0);
    }
}
