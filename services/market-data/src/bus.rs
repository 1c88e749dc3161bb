//! In-process event bus
//!
//! Topic-keyed pub/sub. Topics are opaque strings here; prefix semantics
//! live in `topics`. Delivery is per-subscriber and best-effort: callbacks
//! run outside the subscriber map lock, and a callback that panics is
//! isolated and logged, never removed; the owner re-registers after
//! reconnect.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error};
use types::ids::UserId;

use crate::envelope::{Envelope, MessageKind, OrderPayload, PricePayload, TradePayload};
use crate::topics;
use types::ids::Symbol;

/// A delivery callback. Implementations must be fast and non-blocking:
/// the intended shape is a push into the subscriber's bounded outbound
/// queue, drained by that subscriber's own writer task.
pub trait Deliver: Send + Sync {
    fn deliver(&self, envelope: &Envelope);
}

impl<F> Deliver for F
where
    F: Fn(&Envelope) + Send + Sync,
{
    fn deliver(&self, envelope: &Envelope) {
        self(envelope)
    }
}

/// Topic-keyed publish/subscribe hub.
///
/// Publish is far more frequent than (un)subscribe, so the subscriber map
/// sits behind a read-write lock and publish only takes the read side.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<String, HashMap<String, Arc<dyn Deliver>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str, subscriber_id: &str, deliver: Arc<dyn Deliver>) {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subs.entry(topic.to_string())
            .or_default()
            .insert(subscriber_id.to_string(), deliver);
        debug!(topic, subscriber_id, "bus subscribe");
    }

    pub fn unsubscribe(&self, topic: &str, subscriber_id: &str) {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(entries) = subs.get_mut(topic) {
            entries.remove(subscriber_id);
            if entries.is_empty() {
                subs.remove(topic);
            }
        }
        debug!(topic, subscriber_id, "bus unsubscribe");
    }

    /// Drop a subscriber from every topic (disconnect path).
    pub fn unsubscribe_all(&self, subscriber_id: &str) {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subs.retain(|_, entries| {
            entries.remove(subscriber_id);
            !entries.is_empty()
        });
    }

    /// Deliver an envelope to every subscriber of `topic`.
    ///
    /// Never blocks on a subscriber: the callback set is snapshotted under
    /// the read lock and invoked after it is released.
    pub fn publish(&self, topic: &str, envelope: &Envelope) {
        let targets: Vec<Arc<dyn Deliver>> = {
            let subs = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match subs.get(topic) {
                Some(entries) => entries.values().cloned().collect(),
                None => return,
            }
        };

        for deliver in targets {
            if catch_unwind(AssertUnwindSafe(|| deliver.deliver(envelope))).is_err() {
                error!(topic, "subscriber delivery panicked; entry kept");
            }
        }
    }

    pub fn has_subscribers(&self, topic: &str) -> bool {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .is_some_and(|entries| !entries.is_empty())
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, HashMap::len)
    }

    /// Topics with at least one subscriber.
    pub fn active_topics(&self) -> Vec<String> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    // ---- typed publish helpers ----

    /// Publish a `PRICE_UPDATE` on `price:<symbol>`.
    pub fn publish_price(&self, symbol: &Symbol, payload: &PricePayload) {
        let topic = topics::price(symbol);
        let envelope = Envelope::new(MessageKind::PriceUpdate, Some(topic.clone()), Some(payload));
        self.publish(&topic, &envelope);
    }

    /// Publish an `ORDER_UPDATE` on `order:<user>`.
    pub fn publish_order_update(&self, user: &UserId, payload: &OrderPayload) {
        let topic = topics::order(user);
        let envelope = Envelope::new(MessageKind::OrderUpdate, Some(topic.clone()), Some(payload));
        self.publish(&topic, &envelope);
    }

    /// Publish a `TRADE_UPDATE` on `trade:<user>`.
    pub fn publish_trade_update(&self, user: &UserId, payload: &TradePayload) {
        let topic = topics::trade(user);
        let envelope = Envelope::new(MessageKind::TradeUpdate, Some(topic.clone()), Some(payload));
        self.publish(&topic, &envelope);
    }
}
