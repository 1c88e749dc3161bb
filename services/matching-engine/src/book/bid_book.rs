//! Bid (buy-side) order book
//!
//! Limit bids are kept in a price-ordered map, best (highest) first, with
//! FIFO arrival order inside each level. Market bids have no price and
//! take priority over every limit level, among themselves by arrival.

use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::Price;
use types::order::Order;

use super::price_level::PriceLevel;

/// Bid (buy) side of a book.
#[derive(Debug, Default)]
pub struct BidBook {
    /// MARKET orders awaiting a counterparty, always ahead of limit levels.
    market: PriceLevel,
    /// Limit levels; highest price is best.
    levels: BTreeMap<Price, PriceLevel>,
}

impl BidBook {
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
            .or_else(|| self.levels.values().next_back().and_then(PriceLevel::front))
    }

    pub fn front_mut(&mut self) -> Option<&mut Order> {
        if !self.market.is_empty() {
            return self.market.front_mut();
        }
        self.levels
            .values_mut()
            .next_back()
            .and_then(PriceLevel::front_mut)
    }

    /// Remove the head of the side, dropping its level if emptied.
    pub fn pop_front(&mut self) -> Option<Order> {
        if !self.market.is_empty() {
            return self.market.pop_front();
        }
        let price = *self.levels.keys().next_back()?;
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

    /// Best limit bid price. Market orders carry no quote.
    pub fn best_price(&self) -> Option<Price> {
        self.levels.keys().next_back().copied()
    }

    pub fn order_count(&self) -> usize {
        self.market.len() + self.levels.values().map(PriceLevel::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.market.is_empty() && self.levels.is_empty()
    }
}
