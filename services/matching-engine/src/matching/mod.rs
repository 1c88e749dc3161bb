//! Matching logic
//!
//! The cross pass walks both heads of one book under its lock, pairing
//! eligible orders until the book is uncrossed.

pub mod crossing;

use types::numeric::{Price, Quantity};
use types::trade::Match;

use crate::book::OrderBook;

/// Run one cross pass over a book.
///
/// Matches are handed to `emit` strictly in discovery order. The pass
/// mutates fill state in place and pops entries the moment they fill, so
/// every order left on the book keeps remaining quantity > 0.
pub fn cross_book(
    book: &mut OrderBook,
    last_trade: Option<Price>,
    now: i64,
    emit: &mut dyn FnMut(Match),
) {
    loop {
        let price = {
            let (Some(buy), Some(sell)) = (book.bids.front(), book.asks.front()) else {
                break;
            };
            match crossing::cross_price(buy, sell, last_trade) {
                Some(price) => price,
                None => break,
            }
        };

        let (buy, sell) = book.fronts_mut();
        // Both heads exist: the peek above returned a price.
        let (Some(buy), Some(sell)) = (buy, sell) else {
            break;
        };

        let quantity = Quantity::new(buy.remaining().min(sell.remaining()));
        buy.add_fill(quantity, price, now);
        sell.add_fill(quantity, price, now);

        let matched = Match {
            buy_order_id: buy.order_id,
            sell_order_id: sell.order_id,
            symbol: buy.symbol.clone(),
            quantity,
            price,
            buyer_user_id: buy.user_id,
            seller_user_id: sell.user_id,
            timestamp: now,
        };
        let buy_done = buy.is_filled();
        let sell_done = sell.is_filled();

        if buy_done {
            book.bids.pop_front();
        }
        if sell_done {
            book.asks.pop_front();
        }

        emit(matched);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{AccountId, PortfolioId, Symbol, UserId};
    use types::order::{Order, OrderStatus, OrderType, Side, TimeInForce};

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

    fn collect_matches(book: &mut OrderBook) -> Vec<Match> {
        let mut matches = Vec::new();
        cross_book(book, None, 2000, &mut |m| matches.push(m));
        matches
    }

    #[test]
    fn test_simple_cross_full_fill() {
        let mut book = OrderBook::new();
        let buy = resting(Side::BUY, 150, 10, 1000);
        let sell = resting(Side::SELL, 149, 10, 1001);
        let (buy_id, sell_id) = (buy.order_id, sell.order_id);
        book.add_order(buy);
        book.add_order(sell);

        let matches = collect_matches(&mut book);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].buy_order_id, buy_id);
        assert_eq!(matches[0].sell_order_id, sell_id);
        assert_eq!(matches[0].quantity, Quantity::from_u64(10));
        // Earlier arrival (the buy) wins the price tie-break.
        assert_eq!(matches[0].price, Price::from_u64(150));
        assert_eq!(book.depth(), (0, 0));
    }

    #[test]
    fn test_partial_fill_leaves_remainder() {
        let mut book = OrderBook::new();
        book.add_order(resting(Side::BUY, 150, 20, 1000));
        book.add_order(resting(Side::SELL, 149, 10, 1001));

        let matches = collect_matches(&mut book);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].quantity, Quantity::from_u64(10));
        assert_eq!(matches[0].price, Price::from_u64(150));

        let head = book.bids.front().unwrap();
        assert_eq!(head.status, OrderStatus::PartiallyFilled);
        assert_eq!(head.remaining(), Quantity::from_u64(10).as_decimal());
        assert_eq!(book.depth(), (1, 0));
    }

    #[test]
    fn test_no_cross_emits_nothing() {
        let mut book = OrderBook::new();
        book.add_order(resting(Side::BUY, 100, 10, 1000));
        book.add_order(resting(Side::SELL, 110, 10, 1001));

        assert!(collect_matches(&mut book).is_empty());
        assert_eq!(book.depth(), (1, 1));
    }

    #[test]
    fn test_sweep_matches_in_discovery_order() {
        let mut book = OrderBook::new();
        book.add_order(resting(Side::SELL, 149, 5, 1000));
        book.add_order(resting(Side::SELL, 150, 5, 1001));
        book.add_order(resting(Side::BUY, 151, 10, 1002));

        let matches = collect_matches(&mut book);
        assert_eq!(matches.len(), 2);
        // Cheapest ask consumed first, at its own limit (earlier arrival).
        assert_eq!(matches[0].price, Price::from_u64(149));
        assert_eq!(matches[1].price, Price::from_u64(150));
        assert_eq!(book.depth(), (0, 0));
    }

    #[test]
    fn test_post_pass_book_uncrossed() {
        let mut book = OrderBook::new();
        book.add_order(resting(Side::BUY, 152, 5, 1000));
        book.add_order(resting(Side::BUY, 148, 5, 1001));
        book.add_order(resting(Side::SELL, 150, 5, 1002));

        collect_matches(&mut book);
        match (book.best_bid(), book.best_ask()) {
            (Some(bid), Some(ask)) => assert!(bid < ask, "book must be uncrossed"),
            _ => {} // a side emptied, also fine
        }
    }
}
