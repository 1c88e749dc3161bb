//! Position tracking types
//!
//! A position aggregates one portfolio's holding in one symbol. Cost basis
//! is tracked twice: the weighted average on the position itself, and the
//! per-purchase lots consumed FIFO by sells.

use crate::errors::PositionError;
use crate::ids::{PortfolioId, Symbol, TradeId};
use crate::numeric::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Holding of one symbol in one portfolio.
///
/// Deleted when quantity reaches zero; a flat position is never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub position_id: Uuid,
    pub portfolio_id: PortfolioId,
    pub symbol: Symbol,
    pub quantity: Quantity,
    pub avg_cost: Price,
    /// quantity × avg_cost
    pub total_cost: Decimal,
    pub opened_at: i64,
    pub updated_at: i64,
}

impl Position {
    /// Open a position from the first BUY fill.
    pub fn open(
        portfolio_id: PortfolioId,
        symbol: Symbol,
        quantity: Quantity,
        price: Price,
        timestamp: i64,
    ) -> Self {
        Self {
            position_id: Uuid::now_v7(),
            portfolio_id,
            symbol,
            quantity,
            avg_cost: price,
            total_cost: quantity.as_decimal() * price.as_decimal(),
            opened_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Fold a BUY fill in via weighted average.
    pub fn apply_buy(&mut self, quantity: Quantity, price: Price, timestamp: i64) {
        let new_qty = self.quantity + quantity;
        let new_total = self.total_cost + quantity.as_decimal() * price.as_decimal();
        self.avg_cost = Price::new(new_total / new_qty.as_decimal());
        self.quantity = new_qty;
        self.total_cost = new_total;
        self.updated_at = timestamp;
    }

    /// Reduce the position for a SELL fill. The average cost is unchanged;
    /// total cost is recomputed from the remaining quantity.
    pub fn apply_sell(&mut self, quantity: Quantity, timestamp: i64) -> Result<(), PositionError> {
        if quantity.as_decimal() > self.quantity.as_decimal() {
            return Err(PositionError::InsufficientQuantity {
                symbol: self.symbol.to_string(),
                requested: quantity.to_string(),
                held: self.quantity.to_string(),
            });
        }
        self.quantity = self.quantity - quantity;
        self.total_cost = self.quantity.as_decimal() * self.avg_cost.as_decimal();
        self.updated_at = timestamp;
        Ok(())
    }

    /// Whether the position has been fully sold out.
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Invariant: total_cost == quantity × avg_cost.
    pub fn check_invariant(&self) -> bool {
        self.total_cost == self.quantity.as_decimal() * self.avg_cost.as_decimal()
    }
}

/// Cost-basis record of one BUY fill, consumed FIFO by sells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionLot {
    pub lot_id: Uuid,
    pub position_id: Uuid,
    pub portfolio_id: PortfolioId,
    pub trade_id: TradeId,
    pub quantity: Quantity,
    pub remaining: Quantity,
    pub cost_per_unit: Price,
    pub purchased_at: i64,
}

impl PositionLot {
    pub fn new(
        position_id: Uuid,
        portfolio_id: PortfolioId,
        trade_id: TradeId,
        quantity: Quantity,
        cost_per_unit: Price,
        purchased_at: i64,
    ) -> Self {
        Self {
            lot_id: Uuid::now_v7(),
            position_id,
            portfolio_id,
            trade_id,
            quantity,
            remaining: quantity,
            cost_per_unit,
            purchased_at,
        }
    }

    /// Consume up to `want` units from this lot, returning the amount
    /// actually taken.
    pub fn consume(&mut self, want: Decimal) -> Decimal {
        let taken = want.min(self.remaining.as_decimal());
        let left = self.remaining.as_decimal() - taken;
        self.remaining = Quantity::try_new(left).unwrap_or_else(Quantity::zero);
        taken
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_position(qty: u64, price: u64) -> Position {
        Position::open(
            PortfolioId::new(),
            Symbol::new("AAPL"),
            Quantity::from_u64(qty),
            Price::from_u64(price),
            1_700_000_000_000,
        )
    }

    #[test]
    fn test_open_sets_cost_basis() {
        let pos = open_position(10, 100);
        assert_eq!(pos.total_cost, Decimal::from(1000));
        assert!(pos.check_invariant());
    }

    #[test]
    fn test_buy_weighted_average() {
        let mut pos = open_position(10, 100);
        pos.apply_buy(Quantity::from_u64(10), Price::from_u64(200), 2);

        assert_eq!(pos.quantity, Quantity::from_u64(20));
        assert_eq!(pos.avg_cost, Price::from_u64(150));
        assert!(pos.check_invariant());
    }

    #[test]
    fn test_sell_keeps_avg_cost() {
        let mut pos = open_position(10, 100);
        pos.apply_sell(Quantity::from_u64(4), 2).unwrap();

        assert_eq!(pos.quantity, Quantity::from_u64(6));
        assert_eq!(pos.avg_cost, Price::from_u64(100));
        assert_eq!(pos.total_cost, Decimal::from(600));
        assert!(pos.check_invariant());
    }

    #[test]
    fn test_sell_to_flat() {
        let mut pos = open_position(10, 100);
        pos.apply_sell(Quantity::from_u64(10), 2).unwrap();
        assert!(pos.is_flat());
        assert_eq!(pos.total_cost, Decimal::ZERO);
    }

    #[test]
    fn test_oversell_rejected() {
        let mut pos = open_position(10, 100);
        let err = pos.apply_sell(Quantity::from_u64(11), 2).unwrap_err();
        assert!(matches!(err, PositionError::InsufficientQuantity { .. }));
        // Untouched on failure
        assert_eq!(pos.quantity, Quantity::from_u64(10));
    }

    #[test]
    fn test_lot_consume_partial_and_exhaust() {
        let mut lot = PositionLot::new(
            Uuid::now_v7(),
            PortfolioId::new(),
            TradeId::new(),
            Quantity::from_u64(10),
            Price::from_u64(100),
            1,
        );

        assert_eq!(lot.consume(Decimal::from(4)), Decimal::from(4));
        assert_eq!(lot.remaining, Quantity::from_u64(6));
        assert!(!lot.is_exhausted());

        // Asking for more than remains takes only what is left
        assert_eq!(lot.consume(Decimal::from(10)), Decimal::from(6));
        assert!(lot.is_exhausted());
    }
}
