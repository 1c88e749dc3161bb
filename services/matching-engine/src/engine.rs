//! Matching engine core
//!
//! Holds the symbol → book table, runs the scheduled cross pass, parks
//! STOP orders until their trigger price, and forwards matches to the
//! settlement channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rust_decimal::Decimal;
use types::ids::{OrderId, Symbol};
use types::numeric::Price;
use types::order::{Order, OrderType, Side};
use types::trade::Match;

use crate::book::OrderBook;
use crate::matching;

/// How often the cross pass sweeps all books.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Last observed market price per symbol, used for MARKET/MARKET crosses.
///
/// Implemented by the price relay; tests plug in fixtures.
pub trait MarkPrice: Send + Sync {
    fn last_price(&self, symbol: &Symbol) -> Option<Price>;
}

/// Mark-price source that knows nothing. MARKET/MARKET head pairs stay
/// resting until a reference price exists.
pub struct NoMarkPrice;

impl MarkPrice for NoMarkPrice {
    fn last_price(&self, _symbol: &Symbol) -> Option<Price> {
        None
    }
}

/// Result of submitting an order to the engine.
#[derive(Debug, Clone)]
pub enum AddOutcome {
    /// Resting on the book; the snapshot carries the OPEN status and
    /// arrival timestamp for persistence.
    Booked(Order),
    /// STOP order parked until its trigger price is observed.
    StopParked(Order),
}

/// Book statistics for one symbol.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookStats {
    pub symbol: Symbol,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub spread: Decimal,
    pub bid_depth: usize,
    pub ask_depth: usize,
}

/// The order matching engine.
pub struct MatchingEngine {
    /// symbol → book. Readers enumerate symbols for the tick; writers
    /// insert new books with double-checked insertion.
    books: RwLock<HashMap<Symbol, Arc<Mutex<OrderBook>>>>,
    /// STOP orders parked per symbol until activation.
    stops: Mutex<HashMap<Symbol, Vec<Order>>>,
    match_tx: mpsc::UnboundedSender<Match>,
    mark_price: Arc<dyn MarkPrice>,
    /// Monotonic arrival clock: strictly increasing even when the wall
    /// clock stalls within a millisecond.
    arrival_clock: AtomicI64,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl MatchingEngine {
    pub fn new(match_tx: mpsc::UnboundedSender<Match>, mark_price: Arc<dyn MarkPrice>) -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
            stops: Mutex::new(HashMap::new()),
            match_tx,
            mark_price,
            arrival_clock: AtomicI64::new(0),
        }
    }

    fn next_arrival(&self) -> i64 {
        let now = now_millis();
        let mut prev = self.arrival_clock.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self.arrival_clock.compare_exchange_weak(
                prev,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(seen) => prev = seen,
            }
        }
    }

    /// Book for a symbol, created lazily.
    fn book(&self, symbol: &Symbol) -> Arc<Mutex<OrderBook>> {
        if let Some(book) = self
            .books
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
        {
            return book.clone();
        }
        let mut books = self.books.write().unwrap_or_else(PoisonError::into_inner);
        // Re-check: another writer may have raced us here.
        books
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(Mutex::new(OrderBook::new())))
            .clone()
    }

    fn existing_book(&self, symbol: &Symbol) -> Option<Arc<Mutex<OrderBook>>> {
        self.books
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .cloned()
    }

    /// Submit an order. Non-blocking: returns as soon as the order rests
    /// on the book (or parks, for STOPs). Matching happens on the tick.
    pub fn add_order(&self, mut order: Order) -> AddOutcome {
        if order.order_type == OrderType::STOP {
            self.stops
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(order.symbol.clone())
                .or_default()
                .push(order.clone());
            debug!(order_id = %order.order_id, symbol = %order.symbol, "stop order parked");
            return AddOutcome::StopParked(order);
        }

        order.open(self.next_arrival());
        let snapshot = order.clone();
        let book = self.book(&order.symbol);
        book.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_order(order);
        debug!(
            order_id = %snapshot.order_id,
            symbol = %snapshot.symbol,
            side = ?snapshot.side,
            "order booked"
        );
        AddOutcome::Booked(snapshot)
    }

    /// Remove a working order. Checks parked STOPs first, then the book.
    /// Returns the removed entry with its current fill state.
    pub fn cancel_order(&self, symbol: &Symbol, order_id: &OrderId) -> Option<Order> {
        {
            let mut stops = self.stops.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(parked) = stops.get_mut(symbol) {
                if let Some(idx) = parked.iter().position(|o| &o.order_id == order_id) {
                    let order = parked.remove(idx);
                    if parked.is_empty() {
                        stops.remove(symbol);
                    }
                    return Some(order);
                }
            }
        }
        self.existing_book(symbol)?
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel(order_id)
    }

    /// Feed one observed price; activates parked STOPs whose trigger
    /// crossed. BUY stops fire at or above the stop price, SELL stops at
    /// or below.
    pub fn on_price(&self, symbol: &Symbol, price: Price) {
        let triggered: Vec<Order> = {
            let mut stops = self.stops.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(parked) = stops.get_mut(symbol) else {
                return;
            };
            let mut fired = Vec::new();
            parked.retain(|order| {
                let hit = match order.side {
                    Side::BUY => order.stop_price.map(|s| price >= s),
                    Side::SELL => order.stop_price.map(|s| price <= s),
                }
                .unwrap_or(false);
                if hit {
                    fired.push(order.clone());
                }
                !hit
            });
            if parked.is_empty() {
                stops.remove(symbol);
            }
            fired
        };

        for mut order in triggered {
            // Re-submit as the underlying twin.
            order.order_type = if order.limit_price.is_some() {
                OrderType::LIMIT
            } else {
                OrderType::MARKET
            };
            info!(
                order_id = %order.order_id,
                symbol = %symbol,
                trigger = %price,
                "stop order activated"
            );
            self.add_order(order);
        }
    }

    /// Cross one symbol's book. Returns the number of matches emitted.
    pub fn cross_symbol(&self, symbol: &Symbol) -> usize {
        let Some(book) = self.existing_book(symbol) else {
            return 0;
        };
        let last_trade = self.mark_price.last_price(symbol);
        let now = now_millis();
        let mut emitted = 0usize;

        // The book lock is held for the whole pass; matches leave in
        // discovery order through the unbounded channel.
        let mut book = book.lock().unwrap_or_else(PoisonError::into_inner);
        matching::cross_book(&mut book, last_trade, now, &mut |m| {
            emitted += 1;
            if self.match_tx.send(m).is_err() {
                warn!(symbol = %symbol, "match dropped: settlement channel closed");
            }
        });
        emitted
    }

    /// Cross every book once.
    pub fn cross_all(&self) -> usize {
        let symbols: Vec<Symbol> = self
            .books
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        symbols.iter().map(|s| self.cross_symbol(s)).sum()
    }

    /// Spawn the periodic cross pass.
    pub fn spawn_ticker(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(TICK_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(interval_ms = TICK_INTERVAL.as_millis() as u64, "matching tick started");
            loop {
                tick.tick().await;
                let matched = self.cross_all();
                if matched > 0 {
                    debug!(matched, "cross pass produced matches");
                }
            }
        })
    }

    /// Quote and depth statistics for one symbol.
    pub fn stats(&self, symbol: &Symbol) -> Option<BookStats> {
        let book = self.existing_book(symbol)?;
        let book = book.lock().unwrap_or_else(PoisonError::into_inner);
        let (bid_depth, ask_depth) = book.depth();
        Some(BookStats {
            symbol: symbol.clone(),
            best_bid: book.best_bid(),
            best_ask: book.best_ask(),
            spread: book.spread(),
            bid_depth,
            ask_depth,
        })
    }

    /// Symbols with a live book.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.books
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}
