//! shared ledger boundary
//!
//! the ledger keeps one fixed-size commitment per contract account and
//! applies transition bundles atomically: the precondition is checked, the
//! new commitment stored and the events appended, or nothing happens.

use std::collections::HashMap;

use thiserror::Error;

use crate::events::{EncodedEvent, EventLog, PoolEvent};
use crate::types::{Account, StateCommitment};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("unknown account {0}")]
    UnknownAccount(Account),

    #[error("account {0} already deployed")]
    AlreadyDeployed(Account),

    #[error("precondition failed: expected {expected}, committed {actual}")]
    PreconditionFailed {
        expected: StateCommitment,
        actual: StateCommitment,
    },
}

/// atomic state transition for one account
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionBundle {
    pub account: Account,
    /// commitment the transition was validated against
    pub precondition: StateCommitment,
    /// commitment after the transition
    pub commitment: StateCommitment,
    pub events: Vec<PoolEvent>,
}

/// totally ordered ledger holding per-account commitments and event logs
pub trait SharedLedger {
    /// register an account with its genesis commitment
    fn deploy(&mut self, account: Account, genesis: StateCommitment) -> Result<(), LedgerError>;

    /// commitment currently recorded for `account`
    fn committed(&self, account: &Account) -> Result<StateCommitment, LedgerError>;

    /// apply a bundle, returning the sequence indices of its events
    fn submit(&mut self, bundle: TransitionBundle) -> Result<Vec<u64>, LedgerError>;

    /// events of `account` starting at sequence index `from`
    fn events(&self, account: &Account, from: u64) -> Result<Vec<EncodedEvent>, LedgerError>;
}

#[derive(Clone, Debug, Default)]
struct AccountState {
    commitment: StateCommitment,
    log: EventLog,
}

/// in-process ledger
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    accounts: HashMap<Account, AccountState>,
    /// accepted bundles across all accounts
    height: u64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// number of bundles accepted so far
    pub fn height(&self) -> u64 {
        self.height
    }
}

impl SharedLedger for InMemoryLedger {
    fn deploy(&mut self, account: Account, genesis: StateCommitment) -> Result<(), LedgerError> {
        if self.accounts.contains_key(&account) {
            return Err(LedgerError::AlreadyDeployed(account));
        }
        self.accounts.insert(
            account,
            AccountState {
                commitment: genesis,
                log: EventLog::new(),
            },
        );
        Ok(())
    }

    fn committed(&self, account: &Account) -> Result<StateCommitment, LedgerError> {
        self.accounts
            .get(account)
            .map(|state| state.commitment)
            .ok_or(LedgerError::UnknownAccount(*account))
    }

    fn submit(&mut self, bundle: TransitionBundle) -> Result<Vec<u64>, LedgerError> {
        let state = self
            .accounts
            .get_mut(&bundle.account)
            .ok_or(LedgerError::UnknownAccount(bundle.account))?;

        if state.commitment != bundle.precondition {
            return Err(LedgerError::PreconditionFailed {
                expected: bundle.precondition,
                actual: state.commitment,
            });
        }

        state.commitment = bundle.commitment;
        let indices = bundle
            .events
            .iter()
            .map(|event| state.log.append(event))
            .collect();
        self.height += 1;
        Ok(indices)
    }

    fn events(&self, account: &Account, from: u64) -> Result<Vec<EncodedEvent>, LedgerError> {
        self.accounts
            .get(account)
            .map(|state| state.log.read_from(from).to_vec())
            .ok_or(LedgerError::UnknownAccount(*account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;

    fn commitment(byte: u8) -> StateCommitment {
        StateCommitment { liquidity: [byte; 32], borrows: [byte; 32] }
    }

    #[test]
    fn test_bundle_applies_atomically() {
        let pool = Account::derive(b"pool");
        let mut ledger = InMemoryLedger::new();
        ledger.deploy(pool, commitment(0)).unwrap();

        let event = PoolEvent::Borrow { identity: Identity([1; 32]), amount: 3 };
        let bundle = TransitionBundle {
            account: pool,
            precondition: commitment(9),
            commitment: commitment(1),
            events: vec![event.clone()],
        };

        // wrong precondition: neither commitment nor events change
        let err = ledger.submit(bundle.clone()).unwrap_err();
        assert!(matches!(err, LedgerError::PreconditionFailed { .. }));
        assert_eq!(ledger.committed(&pool).unwrap(), commitment(0));
        assert!(ledger.events(&pool, 0).unwrap().is_empty());

        let accepted = TransitionBundle { precondition: commitment(0), ..bundle };
        assert_eq!(ledger.submit(accepted).unwrap(), vec![0]);
        assert_eq!(ledger.committed(&pool).unwrap(), commitment(1));
        assert_eq!(ledger.events(&pool, 0).unwrap()[0].decode().unwrap(), (0, event));
        assert_eq!(ledger.height(), 1);
    }

    #[test]
    fn test_unknown_and_duplicate_accounts() {
        let pool = Account::derive(b"pool");
        let mut ledger = InMemoryLedger::new();
        assert_eq!(ledger.committed(&pool), Err(LedgerError::UnknownAccount(pool)));
        ledger.deploy(pool, commitment(0)).unwrap();
        assert_eq!(ledger.deploy(pool, commitment(0)), Err(LedgerError::AlreadyDeployed(pool)));
    }
}
