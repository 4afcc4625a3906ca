//! token transfer collaborator
//!
//! the pool never keeps token balances itself; it asks the token contract
//! to move funds and aborts the whole transition if the contract refuses.

use std::collections::HashMap;

use thiserror::Error;

use crate::types::{Account, TokenId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("account {account} holds {available}, transfer needs {requested}")]
    InsufficientBalance {
        account: Account,
        requested: u64,
        available: u64,
    },

    #[error("unknown token")]
    UnknownToken,

    #[error("balance overflow")]
    Overflow,
}

pub trait TokenTransfer {
    fn transfer(
        &mut self,
        from: &Account,
        to: &Account,
        amount: u64,
        token: &TokenId,
    ) -> Result<(), TransferError>;
}

/// single-token balance book
#[derive(Clone, Debug)]
pub struct TokenLedger {
    token: TokenId,
    balances: HashMap<Account, u64>,
}

impl TokenLedger {
    pub fn new(token: TokenId) -> Self {
        Self {
            token,
            balances: HashMap::new(),
        }
    }

    pub fn mint(&mut self, to: Account, amount: u64) -> Result<(), TransferError> {
        let balance = self.balances.entry(to).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(TransferError::Overflow)?;
        Ok(())
    }

    pub fn balance_of(&self, account: &Account) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> u128 {
        self.balances.values().map(|b| *b as u128).sum()
    }
}

impl TokenTransfer for TokenLedger {
    fn transfer(
        &mut self,
        from: &Account,
        to: &Account,
        amount: u64,
        token: &TokenId,
    ) -> Result<(), TransferError> {
        if token != &self.token {
            return Err(TransferError::UnknownToken);
        }

        let available = self.balance_of(from);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                account: *from,
                requested: amount,
                available,
            });
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;

        if from != to {
            self.balances.insert(*from, available - amount);
            self.balances.insert(*to, credited);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_moves_balance() {
        let usd = TokenId::derive("USD");
        let (a, b) = (Account([1; 32]), Account([2; 32]));
        let mut tokens = TokenLedger::new(usd);
        tokens.mint(a, 100).unwrap();

        tokens.transfer(&a, &b, 40, &usd).unwrap();
        assert_eq!(tokens.balance_of(&a), 60);
        assert_eq!(tokens.balance_of(&b), 40);
        assert_eq!(tokens.total_supply(), 100);
    }

    #[test]
    fn test_rejections_leave_balances() {
        let usd = TokenId::derive("USD");
        let (a, b) = (Account([1; 32]), Account([2; 32]));
        let mut tokens = TokenLedger::new(usd);
        tokens.mint(a, 10).unwrap();

        assert_eq!(
            tokens.transfer(&a, &b, 11, &usd),
            Err(TransferError::InsufficientBalance { account: a, requested: 11, available: 10 })
        );
        assert_eq!(
            tokens.transfer(&a, &b, 1, &TokenId::derive("EUR")),
            Err(TransferError::UnknownToken)
        );
        assert_eq!(tokens.balance_of(&a), 10);
        assert_eq!(tokens.balance_of(&b), 0);
    }

    #[test]
    fn test_self_transfer_is_noop() {
        let usd = TokenId::derive("USD");
        let a = Account([1; 32]);
        let mut tokens = TokenLedger::new(usd);
        tokens.mint(a, 5).unwrap();
        tokens.transfer(&a, &a, 5, &usd).unwrap();
        assert_eq!(tokens.balance_of(&a), 5);
    }
}
