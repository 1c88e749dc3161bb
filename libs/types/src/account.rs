//! Cash account types
//!
//! The trading core reads and writes exactly one account field: the cash
//! balance. Everything else about accounts lives behind the persistence
//! interface.

use crate::errors::AccountError;
use crate::ids::{AccountId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountStatus {
    /// Accepts debits and credits
    ACTIVE,
    /// Temporarily blocked from settlement
    FROZEN,
    /// Permanently closed
    CLOSED,
}

/// A user's cash account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub user_id: UserId,
    pub balance: Decimal,
    pub status: AccountStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Account {
    pub fn new(user_id: UserId, balance: Decimal, timestamp: i64) -> Self {
        Self {
            account_id: AccountId::new(),
            user_id,
            balance,
            status: AccountStatus::ACTIVE,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::ACTIVE
    }

    /// Withdraw `amount` from the balance.
    pub fn debit(&mut self, amount: Decimal, timestamp: i64) -> Result<(), AccountError> {
        if !self.is_active() {
            return Err(AccountError::NotActive {
                account_id: self.account_id.to_string(),
            });
        }
        if self.balance < amount {
            return Err(AccountError::InsufficientBalance {
                required: amount.to_string(),
                available: self.balance.to_string(),
            });
        }
        self.balance -= amount;
        self.updated_at = timestamp;
        Ok(())
    }

    /// Deposit `amount` into the balance.
    pub fn credit(&mut self, amount: Decimal, timestamp: i64) -> Result<(), AccountError> {
        if !self.is_active() {
            return Err(AccountError::NotActive {
                account_id: self.account_id.to_string(),
            });
        }
        self.balance += amount;
        self.updated_at = timestamp;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_account(balance: u64) -> Account {
        Account::new(UserId::new(), Decimal::from(balance), 1_700_000_000_000)
    }

    #[test]
    fn test_debit_and_credit() {
        let mut account = active_account(1000);
        account.debit(Decimal::from(400), 2).unwrap();
        assert_eq!(account.balance, Decimal::from(600));

        account.credit(Decimal::from(100), 3).unwrap();
        assert_eq!(account.balance, Decimal::from(700));
    }

    #[test]
    fn test_overdraft_rejected() {
        let mut account = active_account(100);
        let err = account.debit(Decimal::from(101), 2).unwrap_err();
        assert!(matches!(err, AccountError::InsufficientBalance { .. }));
        assert_eq!(account.balance, Decimal::from(100));
    }

    #[test]
    fn test_frozen_account_refuses_settlement() {
        let mut account = active_account(1000);
        account.status = AccountStatus::FROZEN;

        assert!(account.debit(Decimal::from(1), 2).is_err());
        assert!(account.credit(Decimal::from(1), 2).is_err());
    }
}
