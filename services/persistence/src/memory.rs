//! In-memory store implementations
//!
//! Concurrent maps keyed by entity id. Account mutations lock the entry
//! for the duration of the check-and-apply, giving the per-account
//! serialization the settlement layer relies on.

use dashmap::DashMap;
use rust_decimal::Decimal;
use uuid::Uuid;

use types::account::Account;
use types::errors::AccountError;
use types::ids::{AccountId, OrderId, PortfolioId, Symbol};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderStatus};
use types::position::{Position, PositionLot};
use types::trade::Trade;

use crate::store::{AccountStore, OrderStore, PositionStore, StoreError, TradeStore};

fn account_error(err: AccountError) -> StoreError {
    match err {
        AccountError::NotActive { account_id } => StoreError::AccountNotActive { account_id },
        AccountError::InsufficientBalance {
            required,
            available,
        } => StoreError::InsufficientBalance {
            required,
            available,
        },
    }
}

/// Orders, keyed by id.
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: DashMap<OrderId, Order>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for MemoryOrderStore {
    fn insert(&self, order: Order) -> Result<(), StoreError> {
        self.orders.insert(order.order_id, order);
        Ok(())
    }

    fn get(&self, order_id: &OrderId) -> Result<Order, StoreError> {
        self.orders
            .get(order_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| StoreError::not_found("order", order_id))
    }

    fn update_fill(
        &self,
        order_id: &OrderId,
        filled: Quantity,
        avg_price: Option<Price>,
        status: OrderStatus,
        timestamp: i64,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::not_found("order", order_id))?;
        entry.filled_quantity = filled;
        entry.avg_fill_price = avg_price;
        entry.status = status;
        entry.updated_at = timestamp;
        Ok(())
    }

    fn update_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        timestamp: i64,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::not_found("order", order_id))?;
        entry.status = status;
        entry.updated_at = timestamp;
        Ok(())
    }
}

/// Trade records, indexed by order for fill reconstruction.
#[derive(Default)]
pub struct MemoryTradeStore {
    by_order: DashMap<OrderId, Vec<Trade>>,
}

impl MemoryTradeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TradeStore for MemoryTradeStore {
    fn insert(&self, trade: Trade) -> Result<(), StoreError> {
        self.by_order.entry(trade.order_id).or_default().push(trade);
        Ok(())
    }

    fn for_order(&self, order_id: &OrderId) -> Vec<Trade> {
        self.by_order
            .get(order_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }
}

/// Cash accounts with atomic per-entry balance mutation.
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: DashMap<AccountId, Account>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for MemoryAccountStore {
    fn insert(&self, account: Account) -> Result<(), StoreError> {
        self.accounts.insert(account.account_id, account);
        Ok(())
    }

    fn get(&self, account_id: &AccountId) -> Result<Account, StoreError> {
        self.accounts
            .get(account_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| StoreError::not_found("account", account_id))
    }

    fn try_debit(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        timestamp: i64,
    ) -> Result<Decimal, StoreError> {
        let mut entry = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| StoreError::not_found("account", account_id))?;
        entry.debit(amount, timestamp).map_err(account_error)?;
        Ok(entry.balance)
    }

    fn credit(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        timestamp: i64,
    ) -> Result<Decimal, StoreError> {
        let mut entry = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| StoreError::not_found("account", account_id))?;
        entry.credit(amount, timestamp).map_err(account_error)?;
        Ok(entry.balance)
    }
}

/// Positions keyed by (portfolio, symbol), lots grouped per position.
#[derive(Default)]
pub struct MemoryPositionStore {
    positions: DashMap<(PortfolioId, Symbol), Position>,
    lots: DashMap<Uuid, Vec<PositionLot>>,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PositionStore for MemoryPositionStore {
    fn get(&self, portfolio_id: &PortfolioId, symbol: &Symbol) -> Option<Position> {
        self.positions
            .get(&(*portfolio_id, symbol.clone()))
            .map(|entry| entry.clone())
    }

    fn upsert(&self, position: Position) {
        self.positions
            .insert((position.portfolio_id, position.symbol.clone()), position);
    }

    fn delete(&self, portfolio_id: &PortfolioId, symbol: &Symbol) -> bool {
        match self.positions.remove(&(*portfolio_id, symbol.clone())) {
            Some((_, position)) => {
                self.lots.remove(&position.position_id);
                true
            }
            None => false,
        }
    }

    fn insert_lot(&self, lot: PositionLot) {
        self.lots.entry(lot.position_id).or_default().push(lot);
    }

    fn lots(&self, position_id: &Uuid) -> Vec<PositionLot> {
        let mut lots = self
            .lots
            .get(position_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        lots.sort_by_key(|lot| lot.purchased_at);
        lots
    }

    fn update_lot_remaining(
        &self,
        position_id: &Uuid,
        lot_id: &Uuid,
        remaining: Quantity,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .lots
            .get_mut(position_id)
            .ok_or_else(|| StoreError::not_found("position lots", position_id))?;
        let lot = entry
            .iter_mut()
            .find(|lot| &lot.lot_id == lot_id)
            .ok_or_else(|| StoreError::not_found("lot", lot_id))?;
        lot.remaining = remaining;
        Ok(())
    }
}
