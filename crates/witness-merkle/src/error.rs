//! error types for witness-merkle

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MerkleError>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MerkleError {
    /// index does not fit the tree. a correct identity hash never
    /// produces one, so callers treat this as a bug.
    #[error("leaf index {index} out of range for height {height}")]
    IndexOutOfRange { index: u64, height: usize },
}

impl MerkleError {
    /// every merkle error is a programming error
    pub fn is_fatal(&self) -> bool {
        true
    }
}
