//! fixed-height sparse merkle map
//!
//! every index in `0..2^HEIGHT` has a leaf. leaves that were never written
//! hold the zero value, so an untouched subtree hashes to a precomputed
//! constant and only non-default nodes are stored.
//!
//! ```text
//!   level HEIGHT          root
//!                       /      \
//!   level 1          n(0)      n(1)
//!                   /   \      /   \
//!   level 0      leaf  leaf  leaf  leaf      <- hash_leaf(value)
//! ```
//!
//! witnesses are authentication paths ordered leaf -> root and stay valid
//! only as long as no leaf of the map changes.

pub mod error;
pub mod map;
pub mod witness;

pub use error::{MerkleError, Result};
pub use map::MerkleMap;
pub use witness::Witness;

/// 32-byte blake3 digest
pub type Hash = [u8; 32];

/// leaf payload, the canonical zero is an unset leaf
pub type LeafValue = u128;

/// domain separator for leaf hashes
pub const LEAF_DOMAIN: &[u8] = b"witness-merkle.leaf.v1";
/// domain separator for interior nodes
pub const NODE_DOMAIN: &[u8] = b"witness-merkle.node.v1";

/// hash a leaf value
pub fn hash_leaf(value: LeafValue) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(LEAF_DOMAIN);
    hasher.update(&value.to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// hash two children sitting at `level` into their parent
pub fn hash_node(level: usize, left: &Hash, right: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(NODE_DOMAIN);
    hasher.update(&[level as u8]);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// hashes of all-zero subtrees, `zero_hashes(h)[l]` roots a zero subtree of
/// height `l`. the last entry is the empty root.
pub fn zero_hashes(height: usize) -> Vec<Hash> {
    let mut zeros = Vec::with_capacity(height + 1);
    let mut current = hash_leaf(0);
    zeros.push(current);
    for level in 0..height {
        current = hash_node(level, &current, &current);
        zeros.push(current);
    }
    zeros
}

/// root of a map of height `HEIGHT` whose leaves are all zero
pub fn empty_root<const HEIGHT: usize>() -> Hash {
    zero_hashes(HEIGHT)[HEIGHT]
}
