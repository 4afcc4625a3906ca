//! sparse merkle map of fixed height

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{MerkleError, Result};
use crate::witness::Witness;
use crate::{hash_leaf, hash_node, zero_hashes, Hash, LeafValue};

/// merkle map over `2^HEIGHT` leaves
///
/// only nodes that differ from the zero subtree at their level are stored,
/// so memory grows with the number of written leaves times `HEIGHT`.
#[derive(Clone)]
pub struct MerkleMap<const HEIGHT: usize> {
    /// non-zero leaf values
    leaves: BTreeMap<u64, LeafValue>,
    /// non-default nodes keyed by (level, position), level 0 = leaf hashes
    nodes: HashMap<(u8, u64), Hash>,
    /// zero subtree hash per level
    zeros: Vec<Hash>,
    /// cached root
    root: Hash,
}

impl<const HEIGHT: usize> MerkleMap<HEIGHT> {
    const HEIGHT_OK: () = assert!(HEIGHT > 0 && HEIGHT <= 64, "height must be in 1..=64");

    /// empty map, every leaf zero
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::HEIGHT_OK;

        let zeros = zero_hashes(HEIGHT);
        let root = zeros[HEIGHT];
        Self {
            leaves: BTreeMap::new(),
            nodes: HashMap::new(),
            zeros,
            root,
        }
    }

    /// build a map from explicit (index, value) pairs, later pairs win
    pub fn from_leaves<I>(leaves: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u64, LeafValue)>,
    {
        let mut map = Self::new();
        for (index, value) in leaves {
            map.set_leaf(index, value)?;
        }
        Ok(map)
    }

    pub const fn height(&self) -> usize {
        HEIGHT
    }

    /// current root, O(1)
    pub fn root(&self) -> Hash {
        self.root
    }

    /// root of the all-zero map of this height
    pub fn empty_root(&self) -> Hash {
        self.zeros[HEIGHT]
    }

    /// value at `index`, zero for unwritten leaves
    pub fn get(&self, index: u64) -> Result<LeafValue> {
        self.check_index(index)?;
        Ok(self.leaves.get(&index).copied().unwrap_or(0))
    }

    /// number of non-zero leaves
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// non-zero leaves in index order
    pub fn iter(&self) -> impl Iterator<Item = (u64, LeafValue)> + '_ {
        self.leaves.iter().map(|(i, v)| (*i, *v))
    }

    /// number of stored (non-default) nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// write `value` at `index` and rehash its path
    pub fn set_leaf(&mut self, index: u64, value: LeafValue) -> Result<()> {
        self.check_index(index)?;

        if value == 0 {
            self.leaves.remove(&index);
        } else {
            self.leaves.insert(index, value);
        }

        let mut current = hash_leaf(value);
        let mut pos = index;
        self.put_node(0, pos, current);

        for level in 0..HEIGHT {
            let sibling = self.node(level, pos ^ 1);
            current = if pos & 1 == 0 {
                hash_node(level, &current, &sibling)
            } else {
                hash_node(level, &sibling, &current)
            };
            pos >>= 1;
            self.put_node(level + 1, pos, current);
        }

        self.root = current;
        Ok(())
    }

    /// authentication path for `index`, valid against `self.root()`
    pub fn witness_for(&self, index: u64) -> Result<Witness> {
        self.check_index(index)?;

        let mut siblings = Vec::with_capacity(HEIGHT);
        let mut pos = index;
        for level in 0..HEIGHT {
            siblings.push(self.node(level, pos ^ 1));
            pos >>= 1;
        }

        Ok(Witness::new(index, siblings))
    }

    /// check a witness against `root` for a map of this height
    ///
    /// unlike `Witness::verify` this rejects paths of the wrong length and
    /// indices outside `0..2^HEIGHT`.
    pub fn verify(witness: &Witness, index: u64, value: LeafValue, root: &Hash) -> bool {
        witness.height() == HEIGHT && Self::in_range(index) && witness.verify(index, value, root)
    }

    fn in_range(index: u64) -> bool {
        index.checked_shr(HEIGHT as u32).unwrap_or(0) == 0
    }

    fn check_index(&self, index: u64) -> Result<()> {
        if !Self::in_range(index) {
            return Err(MerkleError::IndexOutOfRange {
                index,
                height: HEIGHT,
            });
        }
        Ok(())
    }

    fn node(&self, level: usize, pos: u64) -> Hash {
        self.nodes
            .get(&(level as u8, pos))
            .copied()
            .unwrap_or(self.zeros[level])
    }

    fn put_node(&mut self, level: usize, pos: u64, hash: Hash) {
        // subtrees that return to zero are pruned
        if hash == self.zeros[level] {
            self.nodes.remove(&(level as u8, pos));
        } else {
            self.nodes.insert((level as u8, pos), hash);
        }
    }
}

impl<const HEIGHT: usize> Default for MerkleMap<HEIGHT> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const HEIGHT: usize> fmt::Debug for MerkleMap<HEIGHT> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerkleMap")
            .field("height", &HEIGHT)
            .field("root", &hex::encode(self.root))
            .field("leaves", &self.leaves.len())
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
