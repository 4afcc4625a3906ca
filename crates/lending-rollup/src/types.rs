//! core types for the lending rollup

use core::fmt;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use witness_merkle::{Hash, LeafValue, Witness};

use crate::service::LedgerMap;

/// domain separator for the combined state commitment digest
pub const COMMITMENT_DOMAIN: &[u8] = b"lending-rollup.commitment.v1";

/// user identity, an ed25519 verifying key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Identity(#[serde(with = "hex::serde")] pub [u8; 32]);

impl Identity {
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }

    /// parse the identity back into a key, `None` if it is not a curve point
    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).ok()
    }

    /// token account controlled by this identity
    pub fn account(&self) -> Account {
        Account(self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0)[..16])
    }
}

/// ledger account: the pool contract or a token holder
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Account(#[serde(with = "hex::serde")] pub [u8; 32]);

impl Account {
    /// deterministic account id from a label
    pub fn derive(label: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"lending-rollup.account.v1");
        hasher.update(label);
        Self(*hasher.finalize().as_bytes())
    }
}

impl From<Identity> for Account {
    fn from(identity: Identity) -> Self {
        identity.account()
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0)[..16])
    }
}

/// fungible token identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TokenId(#[serde(with = "hex::serde")] pub [u8; 32]);

impl TokenId {
    pub fn derive(symbol: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"lending-rollup.token.v1");
        hasher.update(symbol.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }
}

/// logical balance maps owned by the witness service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapKind {
    /// liquidity contributed per identity
    Liquidity,
    /// outstanding borrows per identity
    Borrows,
}

impl fmt::Display for MapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKind::Liquidity => write!(f, "liquidity"),
            MapKind::Borrows => write!(f, "borrows"),
        }
    }
}

/// per-identity leaf record, packed as `amount << 64 | sequence`
///
/// `sequence` counts accepted intents against this map and is the replay
/// guard for signed intents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Record {
    pub amount: u64,
    pub sequence: u64,
}

impl Record {
    pub const ZERO: Self = Self { amount: 0, sequence: 0 };

    pub fn new(amount: u64, sequence: u64) -> Self {
        Self { amount, sequence }
    }

    pub fn pack(&self) -> LeafValue {
        ((self.amount as u128) << 64) | self.sequence as u128
    }

    pub fn unpack(value: LeafValue) -> Self {
        Self {
            amount: (value >> 64) as u64,
            sequence: value as u64,
        }
    }

    /// sequence the next accepted intent must carry
    pub fn next_sequence(&self) -> u64 {
        self.sequence.wrapping_add(1)
    }
}

/// the pool's on-chain commitment: one root per balance map
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StateCommitment {
    #[serde(with = "hex::serde")]
    pub liquidity: Hash,
    #[serde(with = "hex::serde")]
    pub borrows: Hash,
}

impl StateCommitment {
    pub fn root(&self, map: MapKind) -> &Hash {
        match map {
            MapKind::Liquidity => &self.liquidity,
            MapKind::Borrows => &self.borrows,
        }
    }

    /// single digest over both roots
    pub fn digest(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(COMMITMENT_DOMAIN);
        hasher.update(&self.liquidity);
        hasher.update(&self.borrows);
        *hasher.finalize().as_bytes()
    }
}

impl fmt::Debug for StateCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCommitment")
            .field("liquidity", &hex::encode(self.liquidity))
            .field("borrows", &hex::encode(self.borrows))
            .finish()
    }
}

impl fmt::Display for StateCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.digest())[..16])
    }
}

/// witness plus the record it claims to authenticate
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipProof {
    pub witness: Witness,
    pub record: Record,
}

impl MembershipProof {
    pub fn new(witness: Witness, record: Record) -> Self {
        Self { witness, record }
    }

    /// path must span the full ledger height
    pub fn verify(&self, index: u64, root: &Hash) -> bool {
        LedgerMap::verify(&self.witness, index, self.record.pack(), root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proof_rejects_short_path() {
        let record = Record::new(7, 1);
        let map = LedgerMap::from_leaves([(9, record.pack())]).unwrap();
        let proof = MembershipProof::new(map.witness_for(9).unwrap(), record);
        assert!(proof.verify(9, &map.root()));

        let mut short = proof.clone();
        short.witness.siblings.truncate(16);
        let forged_root = short.witness.compute_root(record.pack());
        assert!(!short.verify(9, &forged_root));
    }

    #[test]
    fn test_record_packing() {
        let record = Record::new(10_000, 3);
        assert_eq!(Record::unpack(record.pack()), record);
        assert_eq!(Record::ZERO.pack(), 0);
        assert_eq!(Record::unpack(0), Record::ZERO);
        assert_eq!(Record::new(u64::MAX, u64::MAX).pack(), u128::MAX);
    }

    #[test]
    fn test_commitment_digest_binds_order() {
        let a = StateCommitment { liquidity: [1; 32], borrows: [2; 32] };
        let b = StateCommitment { liquidity: [2; 32], borrows: [1; 32] };
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.root(MapKind::Borrows), &[2; 32]);
    }

    #[test]
    fn test_hex_serde() {
        let account = Account([0xab; 32]);
        let json = serde_json::to_string(&account).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        let back: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(back, account);
    }
}
