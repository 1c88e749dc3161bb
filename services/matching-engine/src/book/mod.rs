//! Order book infrastructure module
//!
//! Contains the arrival-ordered price level, bid book, and ask book.

pub mod ask_book;
pub mod bid_book;
pub mod price_level;

pub use ask_book::AskBook;
pub use bid_book::BidBook;
pub use price_level::PriceLevel;

use rust_decimal::Decimal;
use types::ids::OrderId;
use types::numeric::Price;
use types::order::{Order, Side};

/// Order book for a single symbol.
///
/// Bids are ordered by (price desc, arrival asc), asks by (price asc,
/// arrival asc). Every resting entry has remaining quantity > 0; fully
/// consumed entries are popped during the cross pass.
#[derive(Debug, Default)]
pub struct OrderBook {
    pub bids: BidBook,
    pub asks: AskBook,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rest an order on its side. The order must already be OPEN with an
    /// arrival timestamp assigned.
    pub fn add_order(&mut self, order: Order) {
        match order.side {
            Side::BUY => self.bids.insert(order),
            Side::SELL => self.asks.insert(order),
        }
    }

    /// Remove an order by id, scanning both sides. Returns the removed
    /// entry so the caller can persist its final fill state.
    pub fn cancel(&mut self, order_id: &OrderId) -> Option<Order> {
        self.bids.remove(order_id).or_else(|| self.asks.remove(order_id))
    }

    /// Highest resting limit bid, if any.
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best_price()
    }

    /// Lowest resting limit ask, if any.
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best_price()
    }

    /// Best ask minus best bid, or zero when either side has no limit
    /// orders.
    pub fn spread(&self) -> Decimal {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask - bid,
            _ => Decimal::ZERO,
        }
    }

    /// Number of resting orders on each side.
    pub fn depth(&self) -> (usize, usize) {
        (self.bids.order_count(), self.asks.order_count())
    }

    /// Mutable access to both heads at once, for the cross pass.
    pub(crate) fn fronts_mut(&mut self) -> (Option<&mut Order>, Option<&mut Order>) {
        let Self { bids, asks } = self;
        (bids.front_mut(), asks.front_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{AccountId, PortfolioId, Symbol, UserId};
    use types::numeric::Quantity;
    use types::order::{OrderType, TimeInForce};

    fn resting(side: Side, price: u64, qty: u64, arrival: i64) -> Order {
        let mut order = Order::new(
            UserId::new(),
            AccountId::new(),
            PortfolioId::new(),
            Symbol::new("AAPL"),
            side,
            OrderType::LIMIT,
            Some(Price::from_u64(price)),
            None,
            Quantity::from_u64(qty),
            TimeInForce::GTC,
            arrival,
        );
        order.open(arrival);
        order
    }

    #[test]
    fn test_uncrossed_book_quotes() {
        let mut book = OrderBook::new();
        book.add_order(resting(Side::BUY, 100, 10, 1000));
        book.add_order(resting(Side::SELL, 110, 10, 1001));

        assert_eq!(book.best_bid(), Some(Price::from_u64(100)));
        assert_eq!(book.best_ask(), Some(Price::from_u64(110)));
        assert_eq!(book.spread(), Decimal::from(10));
        assert_eq!(book.depth(), (1, 1));
    }

    #[test]
    fn test_spread_zero_when_side_empty() {
        let mut book = OrderBook::new();
        book.add_order(resting(Side::BUY, 100, 10, 1000));

        assert_eq!(book.best_ask(), None);
        assert_eq!(book.spread(), Decimal::ZERO);
    }

    #[test]
    fn test_cancel_scans_both_sides() {
        let mut book = OrderBook::new();
        let bid = resting(Side::BUY, 100, 10, 1000);
        let ask = resting(Side::SELL, 110, 10, 1001);
        let bid_id = bid.order_id;
        let ask_id = ask.order_id;
        book.add_order(bid);
        book.add_order(ask);

        assert!(book.cancel(&ask_id).is_some());
        assert!(book.cancel(&bid_id).is_some());
        assert!(book.cancel(&bid_id).is_none(), "second cancel finds nothing");
        assert_eq!(book.depth(), (0, 0));
    }

    #[test]
    fn test_bid_ordering_price_desc_then_arrival() {
        let mut book = OrderBook::new();
        let a = resting(Side::BUY, 150, 10, 1000);
        let b = resting(Side::BUY, 150, 10, 999); // earlier arrival, same price
        let c = resting(Side::BUY, 151, 10, 1001);
        let b_id = b.order_id;
        let c_id = c.order_id;
        book.add_order(a);
        book.add_order(b);
        book.add_order(c);

        assert_eq!(book.best_bid(), Some(Price::from_u64(151)));
        assert_eq!(book.bids.front().unwrap().order_id, c_id);

        // Pop the 151 head; the earlier arrival leads the 150 level even
        // though it was inserted second.
        book.bids.pop_front();
        assert_eq!(book.bids.front().unwrap().order_id, b_id);
    }

    #[test]
    fn test_ask_ordering_price_asc() {
        let mut book = OrderBook::new();
        book.add_order(resting(Side::SELL, 155, 10, 1000));
        book.add_order(resting(Side::SELL, 149, 10, 1001));
        book.add_order(resting(Side::SELL, 152, 10, 1002));

        assert_eq!(book.best_ask(), Some(Price::from_u64(149)));
    }
}
