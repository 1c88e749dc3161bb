//! Upstream market price relay
//!
//! Maintains one outbound WebSocket to the external trade feed, forwards
//! subscribe/unsubscribe control frames for the symbols clients care
//! about, and normalizes incoming trade batches into `PRICE_UPDATE`
//! events on the bus.
//!
//! Task layout: a supervisor owns the connect loop with exponential
//! backoff; each connection gets a writer task draining the control
//! channel and a reader task spawned separately so a panic there is
//! contained and answered with a reconnect, not a process crash.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use types::ids::Symbol;
use types::numeric::Price;

use crate::bus::EventBus;
use crate::envelope::PricePayload;

/// Finnhub trade-feed endpoint.
pub const FEED_URL: &str = "wss://ws.finnhub.io";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

type FeedStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Inbound feed frame.
#[derive(Debug, Deserialize)]
struct FeedMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Vec<FeedTrade>,
}

/// One trade inside a feed batch.
#[derive(Debug, Clone, Deserialize)]
struct FeedTrade {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: Decimal,
    #[serde(rename = "v", default)]
    volume: Decimal,
    #[serde(rename = "t", default)]
    timestamp: i64,
}

/// Outbound control frame.
#[derive(Serialize)]
struct ControlFrame<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    symbol: &'a str,
}

struct RelayState {
    /// Symbols that must be live upstream; replayed on every (re)connect.
    symbols: Vec<Symbol>,
    /// Last published payload per symbol, baseline for change math.
    last_prices: HashMap<Symbol, PricePayload>,
    control: Option<UnboundedSender<String>>,
    connected: bool,
}

/// Relay from the external trade feed into the event bus.
///
/// With no API key configured the relay is inert: subscriptions are still
/// recorded but no connection is attempted and no prices flow.
pub struct PriceRelay {
    api_key: String,
    url: String,
    bus: Arc<EventBus>,
    state: Mutex<RelayState>,
}

impl PriceRelay {
    pub fn new(api_key: impl Into<String>, bus: Arc<EventBus>) -> Arc<Self> {
        Self::with_url(api_key, FEED_URL, bus)
    }

    pub fn with_url(
        api_key: impl Into<String>,
        url: impl Into<String>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            api_key: api_key.into(),
            url: url.into(),
            bus,
            state: Mutex::new(RelayState {
                symbols: Vec::new(),
                last_prices: HashMap::new(),
                control: None,
                connected: false,
            }),
        })
    }

    pub fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .connected
    }

    /// Last normalized price for a symbol, if one has been observed.
    pub fn last_price(&self, symbol: &Symbol) -> Option<Price> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_prices
            .get(symbol)
            .map(|p| p.price)
    }

    pub fn subscribed_symbols(&self) -> Vec<Symbol> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .symbols
            .clone()
    }

    /// Add symbols to the upstream watch set. Forwarded immediately when
    /// connected, otherwise replayed at the next connect.
    pub fn subscribe(&self, symbols: &[Symbol]) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for symbol in symbols {
            if state.symbols.contains(symbol) {
                continue;
            }
            state.symbols.push(symbol.clone());
            if state.connected {
                send_control(&state.control, "subscribe", symbol);
            }
        }
    }

    /// Remove symbols from the upstream watch set.
    pub fn unsubscribe(&self, symbols: &[Symbol]) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for symbol in symbols {
            let Some(idx) = state.symbols.iter().position(|s| s == symbol) else {
                continue;
            };
            state.symbols.remove(idx);
            if state.connected {
                send_control(&state.control, "unsubscribe", symbol);
            }
        }
    }

    /// Start the connect loop. Returns None when no API key is
    /// configured; the rest of the system runs without price events.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            warn!("no market feed API key configured; price relay disabled");
            return None;
        }
        let relay = self.clone();
        Some(tokio::spawn(relay.run()))
    }

    async fn run(self: Arc<Self>) {
        let url = format!("{}?token={}", self.url, self.api_key);
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match connect_async(url.as_str()).await {
                Ok((stream, _)) => {
                    info!("connected to upstream trade feed");
                    backoff = INITIAL_BACKOFF;
                    let (mut sink, feed) = stream.split();
                    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<String>();

                    let writer = tokio::spawn(async move {
                        while let Some(frame) = control_rx.recv().await {
                            if sink.send(Message::text(frame)).await.is_err() {
                                break;
                            }
                        }
                    });

                    {
                        let mut state =
                            self.state.lock().unwrap_or_else(PoisonError::into_inner);
                        state.control = Some(control_tx.clone());
                        state.connected = true;
                        // Replay the full symbol set on every (re)connect.
                        for symbol in state.symbols.clone() {
                            send_control(&state.control, "subscribe", &symbol);
                        }
                    }

                    let relay = self.clone();
                    let reader =
                        tokio::spawn(async move { relay.read_loop(feed, control_tx).await });
                    match reader.await {
                        Ok(()) => info!("upstream feed disconnected"),
                        Err(err) if err.is_panic() => {
                            error!("feed reader panicked; reconnecting")
                        }
                        Err(_) => {}
                    }

                    {
                        let mut state =
                            self.state.lock().unwrap_or_else(PoisonError::into_inner);
                        state.connected = false;
                        state.control = None;
                    }
                    writer.abort();
                }
                Err(err) => {
                    warn!(error = %err, "upstream connect failed");
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn read_loop(self: Arc<Self>, mut feed: FeedStream, control: UnboundedSender<String>) {
        while let Some(frame) = feed.next().await {
            match frame {
                Ok(Message::Text(text)) => self.handle_frame(&text, &control),
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "feed read error");
                    break;
                }
            }
        }
    }

    fn handle_frame(&self, text: &str, control: &UnboundedSender<String>) {
        let message: FeedMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "unparseable feed frame");
                return;
            }
        };

        match message.kind.as_str() {
            "trade" => self.handle_trades(message.data),
            "ping" => {
                let _ = control.send(r#"{"type":"pong"}"#.to_string());
            }
            "error" => warn!(raw = text, "upstream feed reported error"),
            other => debug!(kind = other, "ignoring feed frame"),
        }
    }

    /// Collapse a trade batch to the latest trade per symbol, refresh the
    /// last-price table, and publish the surviving updates.
    fn handle_trades(&self, trades: Vec<FeedTrade>) {
        let payloads: Vec<PricePayload> = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            latest_per_symbol(trades)
                .into_values()
                .filter_map(|trade| {
                    let symbol = Symbol::try_new(&trade.symbol)?;
                    let previous = state.last_prices.get(&symbol).cloned();
                    let payload = normalize(&trade, symbol, previous.as_ref())?;
                    state
                        .last_prices
                        .insert(payload.symbol.clone(), payload.clone());
                    Some(payload)
                })
                .collect()
        };

        for payload in payloads {
            self.bus.publish_price(&payload.symbol, &payload);
        }
    }
}

fn send_control(control: &Option<UnboundedSender<String>>, kind: &str, symbol: &Symbol) {
    let Some(tx) = control else { return };
    if let Ok(frame) = serde_json::to_string(&ControlFrame {
        kind,
        symbol: symbol.as_str(),
    }) {
        if tx.send(frame).is_err() {
            warn!(symbol = %symbol, kind, "control channel closed");
        } else {
            debug!(symbol = %symbol, kind, "control frame sent upstream");
        }
    }
}

/// Keep only the latest-stamped trade per symbol from one batch.
fn latest_per_symbol(trades: Vec<FeedTrade>) -> HashMap<String, FeedTrade> {
    let mut latest: HashMap<String, FeedTrade> = HashMap::new();
    for trade in trades {
        match latest.get(&trade.symbol) {
            Some(existing) if existing.timestamp >= trade.timestamp => {}
            _ => {
                latest.insert(trade.symbol.clone(), trade);
            }
        }
    }
    latest
}

/// Turn one upstream trade into a price payload, computing change against
/// the previous observation. The first observation has a zero baseline.
fn normalize(trade: &FeedTrade, symbol: Symbol, previous: Option<&PricePayload>) -> Option<PricePayload> {
    let price = Price::try_new(trade.price)?;
    let (change, change_percent) = match previous {
        Some(prev) => {
            let last = prev.price.as_decimal();
            let change = trade.price - last;
            (change, change / last * Decimal::from(100))
        }
        None => (Decimal::ZERO, Decimal::ZERO),
    };

    Some(PricePayload {
        symbol,
        price,
        open: None,
        high: None,
        low: None,
        change,
        change_percent,
        volume: trade.volume.to_i64().unwrap_or(0),
    })
}
