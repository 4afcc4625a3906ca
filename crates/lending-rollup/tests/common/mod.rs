//! shared harness for pool integration tests

#![allow(dead_code)]

use ed25519_dalek::SigningKey;
use lending_rollup::{
    Account, Action, Identity, InMemoryLedger, Intent, LiquidityPool, PoolConfig, SignedIntent,
    TokenId, TokenLedger, WitnessService,
};
use rand::rngs::OsRng;

pub type Pool = LiquidityPool<InMemoryLedger, TokenLedger>;

pub fn token() -> TokenId {
    TokenId::derive("USD")
}

pub fn pool_account() -> Account {
    Account::derive(b"lending-pool")
}

pub struct User {
    pub key: SigningKey,
    pub identity: Identity,
}

impl User {
    pub fn generate() -> Self {
        let key = SigningKey::generate(&mut OsRng);
        let identity = Identity::from_verifying_key(&key.verifying_key());
        Self { key, identity }
    }

    pub fn account(&self) -> Account {
        self.identity.account()
    }

    pub fn sign(&self, action: Action, counterparty: Account, amount: u64, sequence: u64) -> SignedIntent {
        Intent {
            action,
            subject: self.identity,
            counterparty,
            amount,
            token: Some(token()),
            sequence,
        }
        .sign(&self.key)
    }

    /// intent addressed to the pool itself
    pub fn to_pool(&self, action: Action, amount: u64, sequence: u64) -> SignedIntent {
        self.sign(action, pool_account(), amount, sequence)
    }
}

/// token ledger with each user funded
pub fn funded(users: &[(&User, u64)]) -> TokenLedger {
    let mut tokens = TokenLedger::new(token());
    for (user, amount) in users {
        tokens.mint(user.account(), *amount).unwrap();
    }
    tokens
}

/// deployed pool at 100% collateralization
pub fn deployed(tokens: TokenLedger) -> (Pool, WitnessService) {
    deployed_with(PoolConfig::new(pool_account(), token()), tokens)
}

pub fn deployed_with(config: PoolConfig, tokens: TokenLedger) -> (Pool, WitnessService) {
    let mut pool = LiquidityPool::new(config, InMemoryLedger::new(), tokens).unwrap();
    let service = WitnessService::new();
    pool.deploy(&service).unwrap();
    (pool, service)
}
