//! Match and trade records
//!
//! A `Match` is the transient pairing the engine hands to settlement; a
//! `Trade` is the immutable per-side accounting record settlement persists.

use crate::ids::{AccountId, OrderId, PortfolioId, Symbol, TradeId, UserId};
use crate::numeric::{Price, Quantity};
use crate::order::{Order, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A successful pairing of one buy and one sell order.
///
/// Moved from the matching engine to settlement exactly once; settlement is
/// the sole consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub symbol: Symbol,
    pub quantity: Quantity,
    pub price: Price,
    pub buyer_user_id: UserId,
    pub seller_user_id: UserId,
    pub timestamp: i64,
}

/// One side's accounting record for an executed match. Immutable once
/// created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub account_id: AccountId,
    pub portfolio_id: PortfolioId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Quantity,
    pub price: Price,
    /// quantity × price
    pub gross: Decimal,
    /// gross × commission rate
    pub commission: Decimal,
    /// gross + commission for BUY, gross − commission for SELL
    pub net: Decimal,
    pub executed_at: i64,
}

impl Trade {
    /// Build the trade record for one side of a match.
    pub fn from_fill(
        order: &Order,
        quantity: Quantity,
        price: Price,
        commission_rate: Decimal,
        executed_at: i64,
    ) -> Self {
        let gross = quantity.as_decimal() * price.as_decimal();
        let commission = gross * commission_rate;
        let net = match order.side {
            Side::BUY => gross + commission,
            Side::SELL => gross - commission,
        };

        Self {
            trade_id: TradeId::new(),
            order_id: order.order_id,
            user_id: order.user_id,
            account_id: order.account_id,
            portfolio_id: order.portfolio_id,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity,
            price,
            gross,
            commission,
            net,
            executed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{OrderType, TimeInForce};

    fn order_with_side(side: Side) -> Order {
        Order::new(
            UserId::new(),
            AccountId::new(),
            PortfolioId::new(),
            Symbol::new("AAPL"),
            side,
            OrderType::LIMIT,
            Some(Price::from_u64(100)),
            None,
            Quantity::from_u64(10),
            TimeInForce::GTC,
            1_700_000_000_000,
        )
    }

    #[test]
    fn test_buy_trade_pays_commission() {
        let order = order_with_side(Side::BUY);
        let trade = Trade::from_fill(
            &order,
            Quantity::from_u64(10),
            Price::from_u64(100),
            Decimal::new(1, 3), // 0.1%
            1_700_000_000_001,
        );

        assert_eq!(trade.gross, Decimal::from(1000));
        assert_eq!(trade.commission, Decimal::new(1, 0));
        assert_eq!(trade.net, Decimal::new(1001, 0));
    }

    #[test]
    fn test_sell_trade_deducts_commission() {
        let order = order_with_side(Side::SELL);
        let trade = Trade::from_fill(
            &order,
            Quantity::from_u64(10),
            Price::from_u64(100),
            Decimal::new(1, 3),
            1_700_000_000_001,
        );

        assert_eq!(trade.gross, Decimal::from(1000));
        assert_eq!(trade.net, Decimal::new(999, 0));
    }

    #[test]
    fn test_match_serialization_roundtrip() {
        let m = Match {
            buy_order_id: OrderId::new(),
            sell_order_id: OrderId::new(),
            symbol: Symbol::new("AAPL"),
            quantity: Quantity::from_u64(10),
            price: Price::from_u64(150),
            buyer_user_id: UserId::new(),
            seller_user_id: UserId::new(),
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_string(&m).unwrap();
        let back: Match = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }
}
