//! error types for the lending rollup

use thiserror::Error;
use witness_merkle::MerkleError;

use crate::config::ConfigError;
use crate::events::EventError;
use crate::ledger::LedgerError;
use crate::token::TransferError;
use crate::types::MapKind;

pub type Result<T> = std::result::Result<T, PoolError>;

/// why a signed intent was refused
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureFault {
    #[error("identity is not a valid ed25519 key")]
    MalformedKey,

    #[error("signature does not verify")]
    BadSignature,

    #[error("replayed intent: expected sequence {expected}, got {got}")]
    Replayed { expected: u64, got: u64 },

    #[error("intent signed for {got}, submitted as {expected}")]
    WrongAction {
        expected: &'static str,
        got: &'static str,
    },

    #[error("intent names a different token")]
    WrongToken,

    #[error("intent names a different counterparty")]
    WrongCounterparty,
}

#[derive(Debug, Error)]
pub enum PoolError {
    /// witness is stale or forged, fetch a fresh one and resubmit
    #[error("witness does not match committed {map} root")]
    WitnessMismatch { map: MapKind },

    #[error("signature invalid: {0}")]
    SignatureInvalid(SignatureFault),

    #[error("insufficient collateral: need {required}, have {available}")]
    InsufficientCollateral { required: u64, available: u64 },

    #[error("insufficient reserve: requested {requested}, reserve {reserve}")]
    InsufficientReserve { requested: u64, reserve: u64 },

    /// pending deltas block this request until a rollup
    #[error("stale state at index {index}, rollup required")]
    StaleState { index: u64 },

    #[error("amount {requested} exceeds recorded {available}")]
    ExceedsRecord { requested: u64, available: u64 },

    #[error("amount must be non-zero")]
    InvalidAmount,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("identity index collision at {index}")]
    IndexCollision { index: u64 },

    #[error("merkle: {0}")]
    Merkle(#[from] MerkleError),

    #[error("pool not deployed")]
    NotDeployed,

    #[error("pool already deployed")]
    AlreadyDeployed,

    #[error("token transfer rejected: {0}")]
    Transfer(#[from] TransferError),

    #[error("ledger rejected transition: {0}")]
    Ledger(#[from] LedgerError),

    #[error("event codec: {0}")]
    Event(#[from] EventError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

impl PoolError {
    /// programming errors that must not be retried or swallowed
    pub fn is_fatal(&self) -> bool {
        matches!(self, PoolError::Merkle(_) | PoolError::IndexCollision { .. })
    }

    /// the caller may refresh its witness (or roll up) and resubmit
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolError::WitnessMismatch { .. } | PoolError::StaleState { .. }
        )
    }
}

impl From<SignatureFault> for PoolError {
    fn from(fault: SignatureFault) -> Self {
        PoolError::SignatureInvalid(fault)
    }
}
