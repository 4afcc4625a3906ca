//! signed intents
//!
//! every mutating transition is authorized by an ed25519 signature over a
//! domain-separated digest. the action tag is part of the digest, so a
//! signature for one action never validates as another.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};
use witness_merkle::Hash;

use crate::error::SignatureFault;
use crate::types::{Account, Identity, MapKind, TokenId};

/// domain separator for intent digests
pub const INTENT_DOMAIN: &[u8] = b"lending-rollup.intent.v1";

/// mutating pool actions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    AddLiquidity,
    RemoveLiquidity,
    Borrow,
    Repay,
}

impl Action {
    /// domain separation tag mixed into the digest
    pub fn tag(&self) -> &'static str {
        match self {
            Action::AddLiquidity => "addLiquidity",
            Action::RemoveLiquidity => "removeLiquidity",
            Action::Borrow => "borrow",
            Action::Repay => "repay",
        }
    }

    /// balance map this action writes
    pub fn map(&self) -> MapKind {
        match self {
            Action::AddLiquidity | Action::RemoveLiquidity => MapKind::Liquidity,
            Action::Borrow | Action::Repay => MapKind::Borrows,
        }
    }
}

/// what the subject asks the pool to do
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub action: Action,
    /// signer
    pub subject: Identity,
    /// pool account, or the token recipient for borrows
    pub counterparty: Account,
    pub amount: u64,
    pub token: Option<TokenId>,
    /// must be one past the subject's current sequence in `action.map()`
    pub sequence: u64,
}

impl Intent {
    /// digest that gets signed
    pub fn digest(&self) -> Hash {
        let tag = self.action.tag().as_bytes();

        let mut hasher = blake3::Hasher::new();
        hasher.update(INTENT_DOMAIN);
        hasher.update(&[tag.len() as u8]);
        hasher.update(tag);
        hasher.update(&self.subject.0);
        hasher.update(&self.counterparty.0);
        hasher.update(&self.amount.to_le_bytes());
        match &self.token {
            Some(token) => {
                hasher.update(&[1]);
                hasher.update(&token.0);
            }
            None => {
                hasher.update(&[0]);
            }
        }
        hasher.update(&self.sequence.to_le_bytes());
        *hasher.finalize().as_bytes()
    }

    pub fn sign(self, key: &SigningKey) -> SignedIntent {
        let signature = key.sign(&self.digest()).to_bytes();
        SignedIntent {
            intent: self,
            signature,
        }
    }
}

/// intent plus the subject's signature over its digest
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedIntent {
    pub intent: Intent,
    pub signature: [u8; 64],
}

impl SignedIntent {
    /// check the signature under the subject's key
    pub fn verify_signature(&self) -> Result<(), SignatureFault> {
        let key = self
            .intent
            .subject
            .verifying_key()
            .ok_or(SignatureFault::MalformedKey)?;
        let signature = Signature::from_bytes(&self.signature);
        key.verify(&self.intent.digest(), &signature)
            .map_err(|_| SignatureFault::BadSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn intent(key: &SigningKey, action: Action) -> Intent {
        Intent {
            action,
            subject: Identity::from_verifying_key(&key.verifying_key()),
            counterparty: Account::derive(b"pool"),
            amount: 500,
            token: Some(TokenId::derive("USD")),
            sequence: 1,
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let key = SigningKey::generate(&mut OsRng);
        let signed = intent(&key, Action::Borrow).sign(&key);
        assert!(signed.verify_signature().is_ok());
    }

    #[test]
    fn test_tampered_amount_rejected() {
        let key = SigningKey::generate(&mut OsRng);
        let mut signed = intent(&key, Action::Borrow).sign(&key);
        signed.intent.amount += 1;
        assert_eq!(signed.verify_signature(), Err(SignatureFault::BadSignature));
    }

    #[test]
    fn test_cross_action_replay_rejected() {
        let key = SigningKey::generate(&mut OsRng);
        let mut signed = intent(&key, Action::AddLiquidity).sign(&key);
        signed.intent.action = Action::RemoveLiquidity;
        assert_eq!(signed.verify_signature(), Err(SignatureFault::BadSignature));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let key = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);
        let mut signed = intent(&key, Action::Repay).sign(&other);
        // subject still claims `key`
        signed.intent.subject = Identity::from_verifying_key(&key.verifying_key());
        assert_eq!(signed.verify_signature(), Err(SignatureFault::BadSignature));
    }

    #[test]
    fn test_token_presence_changes_digest() {
        let key = SigningKey::generate(&mut OsRng);
        let with = intent(&key, Action::Borrow);
        let mut without = with.clone();
        without.token = None;
        assert_ne!(with.digest(), without.digest());
    }
}
