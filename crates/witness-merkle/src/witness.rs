//! membership witnesses

use crate::{hash_leaf, hash_node, Hash, LeafValue};

/// authentication path for one leaf index
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Witness {
    /// leaf index this path belongs to
    pub index: u64,
    /// sibling hashes from leaf to root
    pub siblings: Vec<Hash>,
}

impl Witness {
    pub fn new(index: u64, siblings: Vec<Hash>) -> Self {
        Self { index, siblings }
    }

    /// tree height this path was produced for
    pub fn height(&self) -> usize {
        self.siblings.len()
    }

    /// root implied by placing `value` at this witness's index
    pub fn compute_root(&self, value: LeafValue) -> Hash {
        let mut current = hash_leaf(value);
        let mut pos = self.index;

        for (level, sibling) in self.siblings.iter().enumerate() {
            current = if pos & 1 == 0 {
                hash_node(level, &current, sibling)
            } else {
                hash_node(level, sibling, &current)
            };
            pos >>= 1;
        }

        current
    }

    /// check that `value` sits at `index` in the tree with root `root`
    ///
    /// the path length is taken as the tree height. use `MerkleMap::verify`
    /// when the height is known.
    pub fn verify(&self, index: u64, value: LeafValue, root: &Hash) -> bool {
        self.index == index && &self.compute_root(value) == root
    }
}
