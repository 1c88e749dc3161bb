//! Trade settlement
//!
//! Applies each match to durable state, once per side: order fill update,
//! trade record, balance mutation, position/lot bookkeeping, then the
//! `ORDER_UPDATE` and `TRADE_UPDATE` events for the owning user.
//!
//! Each match arrives here exactly once, in book-resolution order per
//! symbol, over the engine's match channel. Settlement is not idempotent;
//! a replay would double-book, so failures are logged for the operator
//! and never retried.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use market_data::{EventBus, OrderPayload, TradePayload};
use persistence::{AccountStore, OrderStore, PositionStore, StoreError, TradeStore};
use types::ids::{OrderId, PortfolioId, Symbol};
use types::order::{weighted_avg_price, Order, OrderStatus, Side};
use types::position::{Position, PositionLot};
use types::trade::{Match, Trade};

use crate::stripe::StripeLock;

/// Settlement failures. `Invariant` means admission let through a match
/// the account state cannot honor; the order is forced REJECTED and the
/// condition is logged for the operator; it indicates a bug upstream.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("order {order_id} is not executable in status {status:?}")]
    NotExecutable {
        order_id: String,
        status: OrderStatus,
    },

    #[error("settlement invariant violated for order {order_id}: {reason}")]
    Invariant { order_id: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Applies matches to orders, trades, accounts, and positions.
pub struct Settler {
    orders: Arc<dyn OrderStore>,
    trades: Arc<dyn TradeStore>,
    accounts: Arc<dyn AccountStore>,
    positions: Arc<dyn PositionStore>,
    bus: Arc<EventBus>,
    commission_rate: Decimal,
    /// Serializes position bookkeeping per (portfolio, symbol).
    position_locks: StripeLock<(PortfolioId, Symbol)>,
}

impl Settler {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        trades: Arc<dyn TradeStore>,
        accounts: Arc<dyn AccountStore>,
        positions: Arc<dyn PositionStore>,
        bus: Arc<EventBus>,
        commission_rate: Decimal,
    ) -> Self {
        Self {
            orders,
            trades,
            accounts,
            positions,
            bus,
            commission_rate,
            position_locks: StripeLock::new(),
        }
    }

    /// Consume the engine's match channel until it closes.
    pub fn spawn(self: Arc<Self>, mut matches: UnboundedReceiver<Match>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(m) = matches.recv().await {
                if let Err(err) = self.settle(&m).await {
                    error!(
                        error = %err,
                        buy_order = %m.buy_order_id,
                        sell_order = %m.sell_order_id,
                        symbol = %m.symbol,
                        "settlement failed"
                    );
                }
            }
            info!("settlement channel closed");
        })
    }

    /// Settle one match: the buy side, then the sell side.
    pub async fn settle(&self, m: &Match) -> Result<(), SettlementError> {
        self.settle_side(&m.buy_order_id, m).await?;
        self.settle_side(&m.sell_order_id, m).await?;
        Ok(())
    }

    async fn settle_side(&self, order_id: &OrderId, m: &Match) -> Result<(), SettlementError> {
        let order = self.orders.get(order_id).map_err(|err| match err {
            StoreError::NotFound { .. } => SettlementError::OrderNotFound(order_id.to_string()),
            other => SettlementError::Store(other),
        })?;
        if order.status.is_terminal() {
            return Err(SettlementError::NotExecutable {
                order_id: order_id.to_string(),
                status: order.status,
            });
        }

        // Order fill update first; on an invariant failure below this is
        // the only state that remains, alongside the REJECTED status.
        let new_filled = order.filled_quantity + m.quantity;
        let new_avg = weighted_avg_price(
            order.avg_fill_price,
            order.filled_quantity,
            m.price,
            m.quantity,
        );
        let new_status = if new_filled.as_decimal() >= order.quantity.as_decimal() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.orders
            .update_fill(order_id, new_filled, Some(new_avg), new_status, m.timestamp)?;

        let trade = Trade::from_fill(&order, m.quantity, m.price, self.commission_rate, m.timestamp);

        match order.side {
            Side::BUY => {
                if let Err(err) =
                    self.accounts
                        .try_debit(&order.account_id, trade.net, m.timestamp)
                {
                    return Err(self.fail_fatal(&order, m.timestamp, err));
                }
                self.trades.insert(trade.clone())?;
                self.apply_buy_position(&order, &trade).await;
            }
            Side::SELL => {
                if let Err(reason) = self.apply_sell_position(&order, &trade).await {
                    return Err(self.fail_fatal(&order, m.timestamp, reason));
                }
                self.trades.insert(trade.clone())?;
                self.accounts
                    .credit(&order.account_id, trade.net, m.timestamp)?;
            }
        }

        // ORDER_UPDATE first, then TRADE_UPDATE, per-user ordering.
        self.bus.publish_order_update(
            &order.user_id,
            &OrderPayload {
                order_id: order.order_id.to_string(),
                symbol: order.symbol.clone(),
                side: order.side,
                status: new_status,
                filled_qty: new_filled,
                avg_price: Some(new_avg),
            },
        );
        self.bus.publish_trade_update(
            &order.user_id,
            &TradePayload {
                trade_id: trade.trade_id.to_string(),
                order_id: trade.order_id.to_string(),
                symbol: trade.symbol.clone(),
                side: trade.side,
                quantity: trade.quantity,
                price: trade.price,
                commission: trade.commission,
            },
        );

        Ok(())
    }

    /// Create or grow the position and append the new cost-basis lot.
    async fn apply_buy_position(&self, order: &Order, trade: &Trade) {
        let _stripe = self
            .position_locks
            .acquire((order.portfolio_id, order.symbol.clone()))
            .await;

        let position = match self.positions.get(&order.portfolio_id, &order.symbol) {
            Some(mut position) => {
                position.apply_buy(trade.quantity, trade.price, trade.executed_at);
                position
            }
            None => Position::open(
                order.portfolio_id,
                order.symbol.clone(),
                trade.quantity,
                trade.price,
                trade.executed_at,
            ),
        };
        let position_id = position.position_id;
        self.positions.upsert(position);
        self.positions.insert_lot(PositionLot::new(
            position_id,
            order.portfolio_id,
            trade.trade_id,
            trade.quantity,
            trade.price,
            trade.executed_at,
        ));
    }

    /// Consume lots oldest-first and shrink the position, deleting it at
    /// zero. Errors here are invariant violations: admission checked the
    /// shares before the order reached the book.
    async fn apply_sell_position(&self, order: &Order, trade: &Trade) -> Result<(), String> {
        let _stripe = self
            .position_locks
            .acquire((order.portfolio_id, order.symbol.clone()))
            .await;

        let mut position = self
            .positions
            .get(&order.portfolio_id, &order.symbol)
            .ok_or_else(|| format!("no {} position to sell", order.symbol))?;
        if position.quantity.as_decimal() < trade.quantity.as_decimal() {
            return Err(format!(
                "sell of {} exceeds position quantity {}",
                trade.quantity, position.quantity
            ));
        }

        let mut remaining = trade.quantity.as_decimal();
        for mut lot in self.positions.lots(&position.position_id) {
            if remaining.is_zero() {
                break;
            }
            let taken = lot.consume(remaining);
            if taken.is_zero() {
                continue;
            }
            remaining -= taken;
            if let Err(err) = self.positions.update_lot_remaining(
                &position.position_id,
                &lot.lot_id,
                lot.remaining,
            ) {
                warn!(error = %err, lot = %lot.lot_id, "lot update failed");
            }
        }
        if !remaining.is_zero() {
            // Lots and position quantity disagree; the position total is
            // authoritative, so the sell still proceeds.
            warn!(
                position = %position.position_id,
                unconsumed = %remaining,
                "lot remainders did not cover sell quantity"
            );
        }

        position
            .apply_sell(trade.quantity, trade.executed_at)
            .map_err(|err| err.to_string())?;
        if position.is_flat() {
            self.positions.delete(&order.portfolio_id, &order.symbol);
        } else {
            self.positions.upsert(position);
        }
        Ok(())
    }

    /// Force the order REJECTED and surface an invariant error. These
    /// must not occur when admission runs correctly.
    fn fail_fatal(
        &self,
        order: &Order,
        timestamp: i64,
        reason: impl ToString,
    ) -> SettlementError {
        let reason = reason.to_string();
        error!(
            order_id = %order.order_id,
            user_id = %order.user_id,
            reason = %reason,
            "settlement invariant violated; forcing order REJECTED"
        );
        if let Err(err) =
            self.orders
                .update_status(&order.order_id, OrderStatus::Rejected, timestamp)
        {
            error!(error = %err, order_id = %order.order_id, "failed to mark order rejected");
        }
        SettlementError::Invariant {
            order_id: order.order_id.to_string(),
            reason,
        }
    }
}
