//! Crossing rules
//!
//! Decides whether the two heads of a book can trade and at what price.

use types::numeric::Price;
use types::order::{Order, OrderType};

/// Match price for a head pair, or None when the book is uncrossed.
///
/// - A MARKET head trades at the limit counterparty's price.
/// - Two MARKET heads trade at the last observed price for the symbol;
///   with no observation yet there is no reference and no match.
/// - Two LIMIT heads cross when bid >= ask; the earlier arrival's limit
///   wins the price (time priority extends to the price tie-break).
pub fn cross_price(buy: &Order, sell: &Order, last_trade: Option<Price>) -> Option<Price> {
    match (buy.order_type, sell.order_type) {
        (OrderType::MARKET, OrderType::MARKET) => last_trade,
        (OrderType::MARKET, _) => sell.limit_price,
        (_, OrderType::MARKET) => buy.limit_price,
        _ => {
            let bid = buy.limit_price?;
            let ask = sell.limit_price?;
            if bid >= ask {
                Some(if buy.arrival_ts <= sell.arrival_ts { bid } else { ask })
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{AccountId, PortfolioId, Symbol, UserId};
    use types::numeric::Quantity;
    use types::order::{Side, TimeInForce};

    fn head(side: Side, price: Option<u64>, arrival: i64) -> Order {
        let mut order = Order::new(
            UserId::new(),
            AccountId::new(),
            PortfolioId::new(),
            Symbol::new("AAPL"),
            side,
            if price.is_some() {
                OrderType::LIMIT
            } else {
                OrderType::MARKET
            },
            price.map(Price::from_u64),
            None,
            Quantity::from_u64(10),
            TimeInForce::GTC,
            arrival,
        );
        order.open(arrival);
        order
    }

    #[test]
    fn test_limit_cross_earlier_arrival_sets_price() {
        let buy = head(Side::BUY, Some(150), 1000);
        let sell = head(Side::SELL, Some(149), 1001);
        assert_eq!(cross_price(&buy, &sell, None), Some(Price::from_u64(150)));

        let buy = head(Side::BUY, Some(150), 1001);
        let sell = head(Side::SELL, Some(149), 1000);
        assert_eq!(cross_price(&buy, &sell, None), Some(Price::from_u64(149)));
    }

    #[test]
    fn test_uncrossed_limits() {
        let buy = head(Side::BUY, Some(100), 1000);
        let sell = head(Side::SELL, Some(110), 1001);
        assert_eq!(cross_price(&buy, &sell, None), None);
    }

    #[test]
    fn test_market_takes_counterparty_limit() {
        let buy = head(Side::BUY, None, 1000);
        let sell = head(Side::SELL, Some(149), 1001);
        assert_eq!(cross_price(&buy, &sell, None), Some(Price::from_u64(149)));

        let buy = head(Side::BUY, Some(150), 1000);
        let sell = head(Side::SELL, None, 1001);
        assert_eq!(cross_price(&buy, &sell, None), Some(Price::from_u64(150)));
    }

    #[test]
    fn test_market_vs_market_needs_reference() {
        let buy = head(Side::BUY, None, 1000);
        let sell = head(Side::SELL, None, 1001);
        assert_eq!(cross_price(&buy, &sell, None), None);
        assert_eq!(
            cross_price(&buy, &sell, Some(Price::from_u64(150))),
            Some(Price::from_u64(150))
        );
    }
}
