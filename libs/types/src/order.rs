//! Order lifecycle types
//!
//! An order is created PENDING, moves to OPEN when it reaches the book,
//! and from there transitions only through fills or cancellation. Terminal
//! states never transition again.

use crate::ids::{AccountId, OrderId, PortfolioId, Symbol, UserId};
use crate::numeric::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    BUY,
    SELL,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::BUY => Side::SELL,
            Side::SELL => Side::BUY,
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Execute against the counterparty's limit price.
    MARKET,
    /// Execute at the limit price or better.
    LIMIT,
    /// Parked until the observed price crosses the stop price, then
    /// re-submitted as the LIMIT or MARKET twin.
    STOP,
}

/// How long an order remains working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-till-cancel (default)
    GTC,
    /// Good for the trading day
    DAY,
    /// Immediate-or-cancel
    IOC,
    /// Fill-or-kill
    FOK,
}

impl Default for TimeInForce {
    fn default() -> Self {
        TimeInForce::GTC
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted, not yet on the book
    Pending,
    /// Resting on the book
    Open,
    PartiallyFilled,
    /// Completely filled (terminal)
    Filled,
    /// Cancelled by the user (terminal)
    Cancelled,
    /// Failed validation or settlement invariant (terminal)
    Rejected,
    /// Time-in-force deadline reached (terminal)
    Expired,
}

impl OrderStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }

    /// Only working orders can be cancelled.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Open | OrderStatus::PartiallyFilled
        )
    }
}

/// A brokerage order.
///
/// `arrival_ts` is assigned by the matching engine when the order reaches
/// the book and drives time priority; it stays zero before that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub account_id: AccountId,
    pub portfolio_id: PortfolioId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    /// Required for LIMIT orders; None means unset (MARKET).
    pub limit_price: Option<Price>,
    /// Required for STOP orders.
    pub stop_price: Option<Price>,
    pub quantity: Quantity,
    pub filled_quantity: Quantity,
    pub avg_fill_price: Option<Price>,
    pub status: OrderStatus,
    pub time_in_force: TimeInForce,
    pub arrival_ts: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    /// Create a new pending order.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        account_id: AccountId,
        portfolio_id: PortfolioId,
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        limit_price: Option<Price>,
        stop_price: Option<Price>,
        quantity: Quantity,
        time_in_force: TimeInForce,
        timestamp: i64,
    ) -> Self {
        Self {
            order_id: OrderId::new(),
            user_id,
            account_id,
            portfolio_id,
            symbol,
            side,
            order_type,
            limit_price,
            stop_price,
            quantity,
            filled_quantity: Quantity::zero(),
            avg_fill_price: None,
            status: OrderStatus::Pending,
            time_in_force,
            arrival_ts: 0,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Quantity still unfilled.
    pub fn remaining(&self) -> Decimal {
        self.quantity.as_decimal() - self.filled_quantity.as_decimal()
    }

    pub fn is_filled(&self) -> bool {
        self.filled_quantity == self.quantity
    }

    pub fn has_fills(&self) -> bool {
        !self.filled_quantity.is_zero()
    }

    /// Invariant: 0 <= filled <= quantity.
    pub fn check_invariant(&self) -> bool {
        self.filled_quantity.as_decimal() <= self.quantity.as_decimal()
    }

    /// Mark the order as resting on the book.
    pub fn open(&mut self, arrival_ts: i64) {
        debug_assert_eq!(self.status, OrderStatus::Pending);
        self.status = OrderStatus::Open;
        self.arrival_ts = arrival_ts;
        self.updated_at = arrival_ts;
    }

    /// Apply a fill, updating the weighted average price and status.
    ///
    /// # Panics
    /// Panics if the fill would exceed the order quantity.
    pub fn add_fill(&mut self, fill_quantity: Quantity, fill_price: Price, timestamp: i64) {
        let new_filled = self.filled_quantity + fill_quantity;
        assert!(
            new_filled.as_decimal() <= self.quantity.as_decimal(),
            "fill would exceed order quantity"
        );

        self.avg_fill_price = Some(weighted_avg_price(
            self.avg_fill_price,
            self.filled_quantity,
            fill_price,
            fill_quantity,
        ));
        self.filled_quantity = new_filled;
        self.status = if self.is_filled() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at = timestamp;
    }

    /// Cancel the order.
    ///
    /// # Panics
    /// Panics if the order is already terminal.
    pub fn cancel(&mut self, timestamp: i64) {
        assert!(self.status.can_cancel(), "cannot cancel terminal order");
        self.status = OrderStatus::Cancelled;
        self.updated_at = timestamp;
    }
}

/// Weighted average fill price over an old fill state and a new fill.
pub fn weighted_avg_price(
    old_avg: Option<Price>,
    old_qty: Quantity,
    new_price: Price,
    new_qty: Quantity,
) -> Price {
    let total = old_qty.as_decimal() + new_qty.as_decimal();
    if total.is_zero() {
        return new_price;
    }
    let old_value = old_avg.map(|p| p.as_decimal()).unwrap_or_default() * old_qty.as_decimal();
    let new_value = new_price.as_decimal() * new_qty.as_decimal();
    Price::new((old_value + new_value) / total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order(side: Side, qty: u64, limit: Option<u64>) -> Order {
        Order::new(
            UserId::new(),
            AccountId::new(),
            PortfolioId::new(),
            Symbol::new("AAPL"),
            side,
            if limit.is_some() {
                OrderType::LIMIT
            } else {
                OrderType::MARKET
            },
            limit.map(Price::from_u64),
            None,
            Quantity::from_u64(qty),
            TimeInForce::GTC,
            1_700_000_000_000,
        )
    }

    #[test]
    fn test_order_creation() {
        let order = sample_order(Side::BUY, 10, Some(150));
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!order.has_fills());
        assert_eq!(order.remaining(), Quantity::from_u64(10).as_decimal());
    }

    #[test]
    fn test_open_assigns_arrival() {
        let mut order = sample_order(Side::BUY, 10, Some(150));
        order.open(1_700_000_000_123);
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.arrival_ts, 1_700_000_000_123);
    }

    #[test]
    fn test_partial_then_full_fill() {
        let mut order = sample_order(Side::BUY, 10, Some(150));
        order.open(1);

        order.add_fill(Quantity::from_u64(4), Price::from_u64(150), 2);
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.remaining(), Quantity::from_u64(6).as_decimal());

        order.add_fill(Quantity::from_u64(6), Price::from_u64(150), 3);
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.is_filled());
        assert_eq!(order.avg_fill_price, Some(Price::from_u64(150)));
    }

    #[test]
    fn test_weighted_avg_across_prices() {
        let mut order = sample_order(Side::BUY, 10, Some(150));
        order.open(1);

        order.add_fill(Quantity::from_u64(5), Price::from_u64(100), 2);
        order.add_fill(Quantity::from_u64(5), Price::from_u64(200), 3);
        // (5*100 + 5*200) / 10 = 150
        assert_eq!(order.avg_fill_price, Some(Price::from_u64(150)));
    }

    #[test]
    #[should_panic(expected = "fill would exceed order quantity")]
    fn test_overfill_panics() {
        let mut order = sample_order(Side::BUY, 10, Some(150));
        order.open(1);
        order.add_fill(Quantity::from_u64(11), Price::from_u64(150), 2);
    }

    #[test]
    fn test_cancel_eligibility() {
        assert!(OrderStatus::Open.can_cancel());
        assert!(OrderStatus::PartiallyFilled.can_cancel());
        assert!(!OrderStatus::Filled.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
    }

    #[test]
    #[should_panic(expected = "cannot cancel terminal order")]
    fn test_cancel_filled_panics() {
        let mut order = sample_order(Side::SELL, 1, Some(100));
        order.open(1);
        order.add_fill(Quantity::from_u64(1), Price::from_u64(100), 2);
        order.cancel(3);
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap();
        assert_eq!(json, "\"PARTIALLY_FILLED\"");
    }
}
