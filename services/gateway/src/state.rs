//! Shared application state
//!
//! The assembly root constructs every component once and hands this
//! handle to the router. No process-wide singletons: tests build their
//! own state over in-memory stores.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use market_data::{Deliver, Envelope, EventBus, PriceRelay};
use matching_engine::{MarkPrice, MatchingEngine};
use market_data::topics;
use persistence::OrderStore;
use settlement::{Admission, ReferencePrices};
use types::ids::Symbol;
use types::numeric::Price;

use crate::config::GatewayConfig;
use crate::session::SessionManager;

/// Adapter exposing the relay's last-price table to the engine (for
/// MARKET/MARKET crosses) and to admission (for MARKET buy checks).
pub struct RelayPrices(pub Arc<PriceRelay>);

impl MarkPrice for RelayPrices {
    fn last_price(&self, symbol: &Symbol) -> Option<Price> {
        self.0.last_price(symbol)
    }
}

impl ReferencePrices for RelayPrices {
    fn last_price(&self, symbol: &Symbol) -> Option<Price> {
        self.0.last_price(symbol)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub bus: Arc<EventBus>,
    pub relay: Arc<PriceRelay>,
    pub engine: Arc<MatchingEngine>,
    pub admission: Arc<Admission>,
    pub orders: Arc<dyn OrderStore>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    /// Wire the engine's STOP activation to the price stream for one
    /// symbol: a bus subscriber feeds `on_price`, and the relay streams
    /// the symbol. Idempotent per symbol.
    pub fn observe_prices_for_stops(&self, symbol: &Symbol) {
        let topic = topics::price(symbol);
        let engine = self.engine.clone();
        let observed = symbol.clone();
        let deliver: Arc<dyn Deliver> = Arc::new(move |envelope: &Envelope| {
            let Some(price) = price_of(envelope.data.as_ref()) else {
                warn!(topic = ?envelope.topic, "price update without usable price");
                return;
            };
            engine.on_price(&observed, price);
        });
        self.bus.subscribe(&topic, "engine-stops", deliver);
        self.relay.subscribe(std::slice::from_ref(symbol));
    }
}

fn price_of(data: Option<&Value>) -> Option<Price> {
    serde_json::from_value::<Price>(data?.get("price")?.clone()).ok()
}
