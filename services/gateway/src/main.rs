mod auth;
mod config;
mod error;
mod handlers;
mod router;
mod session;
mod state;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use market_data::{EventBus, PriceRelay};
use matching_engine::MatchingEngine;
use persistence::{
    AccountStore, MemoryAccountStore, MemoryOrderStore, MemoryPositionStore, MemoryTradeStore,
    OrderStore, PositionStore, TradeStore,
};
use settlement::{commission_rate, Admission, Settler};

use crate::config::GatewayConfig;
use crate::router::create_router;
use crate::session::SessionManager;
use crate::state::{AppState, RelayPrices};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Arc::new(GatewayConfig::from_env());
    tracing::info!("starting trading gateway");

    // Event plumbing and the upstream relay.
    let bus = Arc::new(EventBus::new());
    let relay = PriceRelay::new(config.finnhub_api_key.clone(), bus.clone());
    let prices = Arc::new(RelayPrices(relay.clone()));

    // Stores. In-memory here; a deployment swaps these behind the same
    // traits without touching the core.
    let orders: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::new());
    let trades: Arc<dyn TradeStore> = Arc::new(MemoryTradeStore::new());
    let accounts: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new());
    let positions: Arc<dyn PositionStore> = Arc::new(MemoryPositionStore::new());

    // Matching engine feeding the settlement task.
    let (match_tx, match_rx) = mpsc::unbounded_channel();
    let engine = Arc::new(MatchingEngine::new(match_tx, prices.clone()));
    let settler = Arc::new(Settler::new(
        orders.clone(),
        trades,
        accounts.clone(),
        positions.clone(),
        bus.clone(),
        commission_rate(),
    ));
    let admission = Arc::new(Admission::new(
        accounts,
        positions,
        prices,
        commission_rate(),
    ));

    relay.start();
    engine.clone().spawn_ticker();
    settler.spawn(match_rx);

    let state = AppState {
        config: config.clone(),
        bus,
        relay,
        engine,
        admission,
        orders,
        sessions: Arc::new(SessionManager::new()),
    };

    let app = create_router(state);
    let listener = TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "gateway listening");
    axum::serve(listener, app).await?;

    Ok(())
}
