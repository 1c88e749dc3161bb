//! WebSocket client sessions
//!
//! One session per accepted upgrade: an opaque id, the authenticated user
//! (if any), a subscription set, and a bounded outbound queue drained by
//! the session's writer task. Frame dispatch, topic validation, and
//! authorization live here; the pumps live in `handlers::ws`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use market_data::{Deliver, Envelope, MessageKind, OutboundQueue, OverflowPolicy, Topic};
use types::ids::UserId;

use crate::state::AppState;

/// Write deadline per frame.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);
/// Read deadline: a silent peer is considered dead after this long.
pub const PONG_WAIT: Duration = Duration::from_secs(60);
/// Ping cadence, 9/10 of the pong deadline.
pub const PING_PERIOD: Duration = Duration::from_secs(54);

/// One connected WebSocket client.
pub struct Session {
    pub id: String,
    pub user_id: Option<UserId>,
    outbound: Mutex<OutboundQueue>,
    wake: Notify,
    closed: AtomicBool,
    subscriptions: Mutex<HashSet<String>>,
}

impl Session {
    pub fn new(user_id: Option<UserId>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::now_v7().to_string(),
            user_id,
            outbound: Mutex::new(OutboundQueue::default()),
            wake: Notify::new(),
            closed: AtomicBool::new(false),
            subscriptions: Mutex::new(HashSet::new()),
        })
    }

    /// Queue a frame for the writer task. On overflow of an undroppable
    /// frame the session is closed; the client resyncs on reconnect.
    pub fn enqueue(&self, envelope: Envelope) {
        if self.is_closed() {
            return;
        }
        let policy = OverflowPolicy::for_envelope(&envelope);
        let overflowed = self
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope, policy)
            .is_err();
        if overflowed {
            warn!(session = %self.id, "outbound queue overflow on private frame; disconnecting");
            self.close();
        } else {
            self.wake.notify_one();
        }
    }

    pub fn send_error(&self, code: &str, message: &str) {
        self.enqueue(Envelope::error(code, message));
    }

    /// Take everything queued for writing.
    pub fn drain(&self) -> Vec<Envelope> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
    }

    /// Future that resolves when frames are queued or the session closes.
    pub fn wakeup(&self) -> Notified<'_> {
        self.wake.notified()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Dispatch one inbound text frame.
    pub fn handle_frame(self: &Arc<Self>, text: &str, state: &AppState) {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(_) => {
                self.send_error("PARSE_ERROR", "invalid message format");
                return;
            }
        };

        match envelope.kind {
            MessageKind::Subscribe => match envelope.topic {
                Some(topic) => self.subscribe(&topic, state),
                None => self.send_error("INVALID_TOPIC", "subscribe requires a topic"),
            },
            MessageKind::Unsubscribe => match envelope.topic {
                Some(topic) => self.unsubscribe(&topic, state),
                None => self.send_error("INVALID_TOPIC", "unsubscribe requires a topic"),
            },
            MessageKind::Ping => self.enqueue(Envelope::plain(MessageKind::Pong, None)),
            _ => self.send_error("UNKNOWN_TYPE", "unknown message type"),
        }
    }

    /// Validate, authorize, and register a subscription.
    pub fn subscribe(self: &Arc<Self>, raw: &str, state: &AppState) {
        let Some(topic) = Topic::parse(raw) else {
            self.send_error("INVALID_TOPIC", "invalid topic format");
            return;
        };

        // Private topics require the session to own the user suffix.
        if topic.is_user_topic() {
            let owner = self.user_id.as_ref().map(UserId::to_string);
            if owner.as_deref() != topic.user_id() {
                self.send_error("UNAUTHORIZED", "cannot subscribe to this topic");
                return;
            }
        }

        // Publishers use the canonical form (symbols uppercased), so the
        // bus registration must too.
        let canonical = topic.to_string();
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(canonical.clone());

        let session = self.clone();
        let deliver: Arc<dyn Deliver> = Arc::new(move |envelope: &Envelope| {
            session.enqueue(envelope.clone());
        });
        state.bus.subscribe(&canonical, &self.id, deliver);

        // Price topics pull the symbol into the upstream relay on demand.
        if let Some(symbol) = topic.symbol() {
            state.relay.subscribe(std::slice::from_ref(symbol));
        }

        self.enqueue(Envelope::plain(MessageKind::Subscribed, Some(canonical.clone())));
        debug!(session = %self.id, topic = %canonical, "subscribed");
    }

    pub fn unsubscribe(&self, raw: &str, state: &AppState) {
        let canonical = Topic::parse(raw).map_or_else(|| raw.to_string(), |t| t.to_string());
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&canonical);
        state.bus.unsubscribe(&canonical, &self.id);
        self.enqueue(Envelope::plain(
            MessageKind::Unsubscribed,
            Some(canonical.clone()),
        ));
        debug!(session = %self.id, topic = %canonical, "unsubscribed");
    }
}

/// Registry of connected sessions.
#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Arc<Session>) {
        info!(
            session = %session.id,
            user = ?session.user_id.as_ref().map(UserId::to_string),
            "client connected"
        );
        self.sessions.insert(session.id.clone(), session);
    }

    /// Remove a session and tear down its bus subscriptions.
    pub fn unregister(&self, session: &Session, state: &AppState) {
        self.sessions.remove(&session.id);
        state.bus.unsubscribe_all(&session.id);
        info!(session = %session.id, "client disconnected");
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use market_data::{EventBus, PriceRelay};
    use matching_engine::MatchingEngine;
    use persistence::{
        AccountStore, MemoryAccountStore, MemoryOrderStore, MemoryPositionStore,
    };
    use settlement::{commission_rate, Admission};
    use types::account::Account;
    use types::ids::Symbol;

    use crate::config::GatewayConfig;
    use crate::state::RelayPrices;

    fn test_state() -> AppState {
        let bus = Arc::new(EventBus::new());
        let relay = PriceRelay::new("", bus.clone());
        let prices = Arc::new(RelayPrices(relay.clone()));
        let (match_tx, _match_rx) = tokio::sync::mpsc::unbounded_channel();
        let engine = Arc::new(MatchingEngine::new(match_tx, prices.clone()));
        let accounts = Arc::new(MemoryAccountStore::new());
        accounts
            .insert(Account::new(types::ids::UserId::new(), Decimal::ZERO, 1))
            .unwrap();
        let admission = Arc::new(Admission::new(
            accounts,
            Arc::new(MemoryPositionStore::new()),
            prices,
            commission_rate(),
        ));

        AppState {
            config: Arc::new(GatewayConfig {
                listen_addr: "127.0.0.1:0".parse().unwrap(),
                finnhub_api_key: String::new(),
                jwt_secret: "secret".to_string(),
            }),
            bus,
            relay,
            engine,
            admission,
            orders: Arc::new(MemoryOrderStore::new()),
            sessions: Arc::new(SessionManager::new()),
        }
    }

    fn kinds(session: &Session) -> Vec<MessageKind> {
        session.drain().iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_subscribe_price_topic() {
        let state = test_state();
        let session = Session::new(None);

        session.subscribe("price:AAPL", &state);

        assert_eq!(kinds(&session), vec![MessageKind::Subscribed]);
        assert!(state.bus.has_subscribers("price:AAPL"));
        // Price subscriptions pull the symbol into the relay set.
        assert_eq!(state.relay.subscribed_symbols(), vec![Symbol::new("AAPL")]);
    }

    #[test]
    fn test_subscribe_canonicalizes_symbol_case() {
        let state = test_state();
        let session = Session::new(None);

        session.subscribe("price:aapl", &state);

        // Publishers emit on the canonical topic; that is what must be
        // registered.
        assert!(state.bus.has_subscribers("price:AAPL"));
        assert_eq!(session.subscriptions(), vec!["price:AAPL".to_string()]);
    }

    #[test]
    fn test_private_topic_requires_matching_user() {
        let state = test_state();
        let user = types::ids::UserId::new();
        let session = Session::new(Some(user));
        let other = types::ids::UserId::new();

        session.subscribe(&format!("order:{other}"), &state);

        let frames = session.drain();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, MessageKind::Error);
        assert_eq!(frames[0].data.as_ref().unwrap()["code"], "UNAUTHORIZED");
        // Nothing recorded, session still open.
        assert!(session.subscriptions().is_empty());
        assert!(!session.is_closed());

        session.subscribe(&format!("order:{user}"), &state);
        assert_eq!(kinds(&session), vec![MessageKind::Subscribed]);
    }

    #[test]
    fn test_anonymous_session_cannot_use_private_topics() {
        let state = test_state();
        let session = Session::new(None);

        session.subscribe("trade:u1", &state);

        let frames = session.drain();
        assert_eq!(frames[0].data.as_ref().unwrap()["code"], "UNAUTHORIZED");
        assert!(!state.bus.has_subscribers("trade:u1"));
    }

    #[test]
    fn test_invalid_topic_rejected() {
        let state = test_state();
        let session = Session::new(None);

        session.subscribe("candles:AAPL", &state);

        let frames = session.drain();
        assert_eq!(frames[0].data.as_ref().unwrap()["code"], "INVALID_TOPIC");
    }

    #[test]
    fn test_frame_dispatch() {
        let state = test_state();
        let session = Session::new(None);

        session.handle_frame(r#"{"type":"PING"}"#, &state);
        session.handle_frame("garbage", &state);
        session.handle_frame(r#"{"type":"PONG"}"#, &state);

        let frames = session.drain();
        assert_eq!(frames[0].kind, MessageKind::Pong);
        assert_eq!(frames[1].data.as_ref().unwrap()["code"], "PARSE_ERROR");
        assert_eq!(frames[2].data.as_ref().unwrap()["code"], "UNKNOWN_TYPE");
    }

    #[test]
    fn test_unsubscribe_stops_bus_delivery() {
        let state = test_state();
        let session = Session::new(None);

        session.subscribe("price:AAPL", &state);
        session.unsubscribe("price:AAPL", &state);

        assert!(!state.bus.has_subscribers("price:AAPL"));
        assert!(session.subscriptions().is_empty());
    }

    #[test]
    fn test_manager_unregister_clears_bus() {
        let state = test_state();
        let session = Session::new(None);
        state.sessions.register(session.clone());
        session.subscribe("price:AAPL", &state);

        state.sessions.unregister(&session, &state);

        assert_eq!(state.sessions.count(), 0);
        assert!(!state.bus.has_subscribers("price:AAPL"));
    }
}
