//! Ask (sell-side) order book
//!
//! Mirror of the bid book with the price ordering flipped: the best ask is
//! the lowest limit level. Market asks take priority over every level.

use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::Price;
use types::order::Order;

use super::price_level::PriceLevel;

/// Ask (sell) side of a book.
#[derive(Debug, Default)]
pub struct AskBook {
    /// MARKET orders awaiting a counterparty, always ahead of limit levels.
    market: PriceLevel,
    /// Limit levels; lowest price is best.
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order: Order) {
        match order.limit_price {
            Some(price) => self.levels.entry(price).or_default().insert(order),
            None => self.market.insert(order),
        }
    }

    /// The order first in line: market orders, then the best limit level.
    pub fn front(&self) -> Option<&Order> {
        self.market
            .front()
            .or_else(|| self.levels.values().next().and_then(PriceLevel::front))
    }

    pub fn front_mut(&mut self) -> Option<&mut Order> {
        if !self.market.is_empty() {
            return self.market.front_mut();
        }
        self.levels
            .values_mut()
            .next()
            .and_then(PriceLevel::front_mut)
    }

    /// Remove the head of the side, dropping its level if emptied.
    pub fn pop_front(&mut self) -> Option<Order> {
        if !self.market.is_empty() {
            return self.market.pop_front();
        }
        let price = *self.levels.keys().next()?;
        let level = self.levels.get_mut(&price)?;
        let order = level.pop_front();
        if level.is_empty() {
            self.levels.remove(&price);
        }
        order
    }

    /// Remove an order by id wherever it rests.
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Order> {
        if let Some(order) = self.market.remove(order_id) {
            return Some(order);
        }
        let mut found_at: Option<Price> = None;
        let mut removed: Option<Order> = None;
        for (price, level) in self.levels.iter_mut() {
            if let Some(order) = level.remove(order_id) {
                if level.is_empty() {
                    found_at = Some(*price);
                }
                removed = Some(order);
                break;
            }
        }
        if let Some(price) = found_at {
            self.levels.remove(&price);
        }
        removed
    }

    /// Best limit ask price. Market orders carry no quote.
    pub fn best_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    pub fn order_count(&self) -> usize {
        self.market.len() + self.levels.values().map(PriceLevel::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.market.is_empty() && self.levels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{AccountId, PortfolioId, Symbol, UserId};
    use types::numeric::Quantity;
    use types::order::{OrderType, Side, TimeInForce};

    fn ask(price: Option<u64>, arrival: i64) -> Order {
        let mut order = Order::new(
            UserId::new(),
            AccountId::new(),
            PortfolioId::new(),
            Symbol::new("AAPL"),
            Side::SELL,
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
    fn test_best_ask_is_lowest() {
        let mut book = AskBook::new();
        book.insert(ask(Some(155), 1));
        book.insert(ask(Some(149), 2));
        book.insert(ask(Some(152), 3));

        assert_eq!(book.best_price(), Some(Price::from_u64(149)));
        assert_eq!(book.front().unwrap().limit_price, Some(Price::from_u64(149)));
    }

    #[test]
    fn test_market_ask_takes_head() {
        let mut book = AskBook::new();
        book.insert(ask(Some(149), 1));
        let market = ask(None, 2);
        let market_id = market.order_id;
        book.insert(market);

        assert_eq!(book.front().unwrap().order_id, market_id);
        assert_eq!(book.best_price(), Some(Price::from_u64(149)));
    }

    #[test]
    fn test_same_price_fifo() {
        let mut book = AskBook::new();
        let first = ask(Some(150), 1);
        let first_id = first.order_id;
        book.insert(first);
        book.insert(ask(Some(150), 2));

        assert_eq!(book.front().unwrap().order_id, first_id);
        assert_eq!(book.order_count(), 2);
    }
}
