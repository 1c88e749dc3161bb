//! Storage traits consumed by the trading core

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use types::account::Account;
use types::ids::{AccountId, OrderId, PortfolioId, Symbol};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderStatus};
use types::position::{Position, PositionLot};
use types::trade::Trade;

/// Storage failures surfaced to the core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("account {account_id} is not active")]
    AccountNotActive { account_id: String },

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Durable order state. The book holds the working copy; this is the
/// system of record the REST surface reads.
pub trait OrderStore: Send + Sync {
    fn insert(&self, order: Order) -> Result<(), StoreError>;
    fn get(&self, order_id: &OrderId) -> Result<Order, StoreError>;
    fn update_fill(
        &self,
        order_id: &OrderId,
        filled: Quantity,
        avg_price: Option<Price>,
        status: OrderStatus,
        timestamp: i64,
    ) -> Result<(), StoreError>;
    fn update_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        timestamp: i64,
    ) -> Result<(), StoreError>;
}

/// Immutable trade records.
pub trait TradeStore: Send + Sync {
    fn insert(&self, trade: Trade) -> Result<(), StoreError>;
    /// Trades for one order, execution order.
    fn for_order(&self, order_id: &OrderId) -> Vec<Trade>;
}

/// Cash accounts. Debit and credit are atomic per account: the check and
/// the mutation happen under one entry lock, which is what serializes
/// balance changes per account.
pub trait AccountStore: Send + Sync {
    fn insert(&self, account: Account) -> Result<(), StoreError>;
    fn get(&self, account_id: &AccountId) -> Result<Account, StoreError>;
    /// Withdraw, failing on inactive account or insufficient funds.
    /// Returns the new balance.
    fn try_debit(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        timestamp: i64,
    ) -> Result<Decimal, StoreError>;
    /// Deposit, failing on inactive account. Returns the new balance.
    fn credit(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        timestamp: i64,
    ) -> Result<Decimal, StoreError>;
}

/// Positions and their FIFO cost-basis lots. Multi-step read-modify-write
/// sequences over one (portfolio, symbol) are serialized by the caller.
pub trait PositionStore: Send + Sync {
    fn get(&self, portfolio_id: &PortfolioId, symbol: &Symbol) -> Option<Position>;
    fn upsert(&self, position: Position);
    /// Delete a position and its lots (the position went flat).
    fn delete(&self, portfolio_id: &PortfolioId, symbol: &Symbol) -> bool;

    fn insert_lot(&self, lot: PositionLot);
    /// Lots for a position, purchased-at ascending.
    fn lots(&self, position_id: &Uuid) -> Vec<PositionLot>;
    fn update_lot_remaining(
        &self,
        position_id: &Uuid,
        lot_id: &Uuid,
        remaining: Quantity,
    ) -> Result<(), StoreError>;
}
