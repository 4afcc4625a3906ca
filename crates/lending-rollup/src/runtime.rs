//! shared pool handle
//!
//! wraps a pool and its witness service for concurrent callers. witness
//! reads take the service read lock only, so clients can fetch proofs while
//! a transition runs elsewhere. transitions and rollups hold the pool mutex
//! for their whole duration, which serializes them per pool.
//!
//! lock order is always pool, then service.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use witness_merkle::Witness;

use crate::error::Result;
use crate::intent::SignedIntent;
use crate::ledger::SharedLedger;
use crate::pool::{LiquidityPool, TransitionReceipt};
use crate::service::WitnessService;
use crate::token::TokenTransfer;
use crate::types::{Identity, MapKind, MembershipProof, Record, StateCommitment};

struct Inner<L, T> {
    pool: Mutex<LiquidityPool<L, T>>,
    service: RwLock<WitnessService>,
}

pub struct PoolRuntime<L, T> {
    inner: Arc<Inner<L, T>>,
}

impl<L, T> Clone for PoolRuntime<L, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: SharedLedger, T: TokenTransfer> PoolRuntime<L, T> {
    pub fn new(pool: LiquidityPool<L, T>, service: WitnessService) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool: Mutex::new(pool),
                service: RwLock::new(service),
            }),
        }
    }

    pub fn deploy(&self) -> Result<StateCommitment> {
        let mut pool = self.inner.pool.lock();
        let service = self.inner.service.read();
        pool.deploy(&service)
    }

    /// witness against the working root
    pub fn witness(&self, map: MapKind, identity: &Identity) -> Result<(Witness, Record)> {
        self.inner.service.read().get_witness(map, identity)
    }

    /// proof against the last committed root, for building a transition
    pub fn committed_witness(&self, map: MapKind, identity: &Identity) -> Result<MembershipProof> {
        self.inner.service.read().get_committed_witness(map, identity)
    }

    /// sequence the next intent of `identity` on `map` must carry
    pub fn next_sequence(&self, map: MapKind, identity: &Identity) -> Result<u64> {
        let service = self.inner.service.read();
        let index = service.resolve(identity)?;
        Ok(service.current_record(map, index)?.next_sequence())
    }

    pub fn add_liquidity(
        &self,
        signed: &SignedIntent,
        proof: &MembershipProof,
    ) -> Result<TransitionReceipt> {
        let mut pool = self.inner.pool.lock();
        let mut service = self.inner.service.write();
        pool.add_liquidity(&mut service, signed, proof)
    }

    pub fn remove_liquidity(
        &self,
        signed: &SignedIntent,
        proof: &MembershipProof,
    ) -> Result<TransitionReceipt> {
        let mut pool = self.inner.pool.lock();
        let mut service = self.inner.service.write();
        pool.remove_liquidity(&mut service, signed, proof)
    }

    pub fn borrow(
        &self,
        signed: &SignedIntent,
        liquidity: &MembershipProof,
        debt: &MembershipProof,
    ) -> Result<TransitionReceipt> {
        let mut pool = self.inner.pool.lock();
        let mut service = self.inner.service.write();
        pool.borrow(&mut service, signed, liquidity, debt)
    }

    pub fn repay(&self, signed: &SignedIntent, debt: &MembershipProof) -> Result<TransitionReceipt> {
        let mut pool = self.inner.pool.lock();
        let mut service = self.inner.service.write();
        pool.repay(&mut service, signed, debt)
    }

    pub fn rollup(&self) -> Result<StateCommitment> {
        let mut pool = self.inner.pool.lock();
        let mut service = self.inner.service.write();
        pool.rollup_liquidity(&mut service)
    }

    /// run `f` with the pool locked
    pub fn with_pool<R>(&self, f: impl FnOnce(&LiquidityPool<L, T>) -> R) -> R {
        let pool = self.inner.pool.lock();
        f(&pool)
    }

    /// run `f` with the service read-locked
    pub fn with_service<R>(&self, f: impl FnOnce(&WitnessService) -> R) -> R {
        let service = self.inner.service.read();
        f(&service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::intent::{Action, Intent};
    use crate::ledger::InMemoryLedger;
    use crate::token::TokenLedger;
    use crate::types::{Account, TokenId};
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn test_witness_reads_while_pool_locked() {
        let token = TokenId::derive("USD");
        let config = PoolConfig::new(Account::derive(b"pool"), token);
        let pool = LiquidityPool::new(config, InMemoryLedger::new(), TokenLedger::new(token)).unwrap();
        let runtime = PoolRuntime::new(pool, WitnessService::new());
        runtime.deploy().unwrap();

        let key = SigningKey::generate(&mut OsRng);
        let identity = Identity::from_verifying_key(&key.verifying_key());

        let proof = runtime.with_pool(|_| {
            // service is a separate lock, readable under the pool mutex
            runtime.committed_witness(MapKind::Liquidity, &identity).unwrap()
        });
        assert_eq!(proof.record, Record::ZERO);
        assert_eq!(runtime.next_sequence(MapKind::Liquidity, &identity).unwrap(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let token = TokenId::derive("USD");
        let pool_account = Account::derive(b"pool");
        let key = SigningKey::generate(&mut OsRng);
        let identity = Identity::from_verifying_key(&key.verifying_key());

        let mut tokens = TokenLedger::new(token);
        tokens.mint(identity.account(), 500).unwrap();
        let pool = LiquidityPool::new(PoolConfig::new(pool_account, token), InMemoryLedger::new(), tokens).unwrap();
        let runtime = PoolRuntime::new(pool, WitnessService::new());
        let other = runtime.clone();
        runtime.deploy().unwrap();

        let proof = runtime.committed_witness(MapKind::Liquidity, &identity).unwrap();
        let signed = Intent {
            action: Action::AddLiquidity,
            subject: identity,
            counterparty: pool_account,
            amount: 500,
            token: None,
            sequence: 1,
        }
        .sign(&key);
        runtime.add_liquidity(&signed, &proof).unwrap();

        assert_eq!(other.with_pool(|pool| pool.reserve()), 500);
        assert!(other.with_service(|service| service.has_pending()));
        let commitment = other.rollup().unwrap();
        assert_eq!(runtime.with_service(|service| service.committed_commitment()), commitment);
    }
}
