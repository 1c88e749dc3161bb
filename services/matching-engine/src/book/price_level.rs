//! Price level with arrival-ordered queue
//!
//! A price level holds every resting order at one price, ordered by
//! arrival timestamp ascending. Insertion honors the timestamp rather than
//! insertion order, so an entry stamped earlier but added later still wins
//! time priority.

use std::collections::VecDeque;
use types::ids::OrderId;
use types::order::Order;

/// Orders resting at a single price point.
#[derive(Debug, Clone, Default)]
pub struct PriceLevel {
    orders: VecDeque<Order>,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an order keeping arrival-ascending order. Equal timestamps
    /// keep insertion order.
    pub fn insert(&mut self, order: Order) {
        let at = self
            .orders
            .iter()
            .position(|o| o.arrival_ts > order.arrival_ts);
        match at {
            Some(idx) => self.orders.insert(idx, order),
            None => self.orders.push_back(order),
        }
    }

    /// The earliest-arrived order at this level.
    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut Order> {
        self.orders.front_mut()
    }

    pub fn pop_front(&mut self) -> Option<Order> {
        self.orders.pop_front()
    }

    /// Remove an order by id, returning it if found.
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Order> {
        let idx = self.orders.iter().position(|o| &o.order_id == order_id)?;
        self.orders.remove(idx)
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{AccountId, PortfolioId, Symbol, UserId};
    use types::numeric::{Price, Quantity};
    use types::order::{OrderType, Side, TimeInForce};

    fn entry(arrival: i64) -> Order {
        let mut order = Order::new(
            UserId::new(),
            AccountId::new(),
            PortfolioId::new(),
            Symbol::new("AAPL"),
            Side::BUY,
            OrderType::LIMIT,
            Some(Price::from_u64(150)),
            None,
            Quantity::from_u64(10),
            TimeInForce::GTC,
            arrival,
        );
        order.open(arrival);
        order
    }

    #[test]
    fn test_insert_keeps_arrival_order() {
        let mut level = PriceLevel::new();
        let late = entry(1000);
        let early = entry(999);
        let early_id = early.order_id;

        level.insert(late);
        level.insert(early); // added second, but arrived first

        assert_eq!(level.front().unwrap().order_id, early_id);
        assert_eq!(level.len(), 2);
    }

    #[test]
    fn test_equal_arrival_keeps_insertion_order() {
        let mut level = PriceLevel::new();
        let first = entry(1000);
        let second = entry(1000);
        let first_id = first.order_id;

        level.insert(first);
        level.insert(second);

        assert_eq!(level.front().unwrap().order_id, first_id);
    }

    #[test]
    fn test_remove_by_id() {
        let mut level = PriceLevel::new();
        let a = entry(1);
        let b = entry(2);
        let a_id = a.order_id;
        level.insert(a);
        level.insert(b);

        assert!(level.remove(&a_id).is_some());
        assert!(level.remove(&a_id).is_none());
        assert_eq!(level.len(), 1);
    }

    #[test]
    fn test_pop_front() {
        let mut level = PriceLevel::new();
        let a = entry(1);
        let a_id = a.order_id;
        level.insert(a);
        level.insert(entry(2));

        assert_eq!(level.pop_front().unwrap().order_id, a_id);
        assert_eq!(level.len(), 1);
    }
}
