//! Message envelope for the client WebSocket protocol
//!
//! Every frame in either direction is one JSON envelope:
//! `{ "type", "topic"?, "data"?, "timestamp" }`. The `type` field is a
//! closed set; dispatch happens by pattern match at the parse boundary and
//! nowhere else.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use types::ids::Symbol;
use types::numeric::{Price, Quantity};
use types::order::{OrderStatus, Side};

/// Closed set of envelope types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    // Inbound from clients
    Subscribe,
    Unsubscribe,
    Ping,
    // Outbound to clients
    Subscribed,
    Unsubscribed,
    Pong,
    PriceUpdate,
    OrderUpdate,
    TradeUpdate,
    Error,
}

/// A single WebSocket frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub timestamp: i64,
}

/// Failure to turn an inbound text frame into an envelope.
#[derive(Debug, Error)]
#[error("invalid message format: {0}")]
pub struct ParseError(#[from] serde_json::Error);

impl Envelope {
    /// Build an envelope, serializing the payload into `data`.
    ///
    /// Payload serialization is infallible for the closed payload set, so
    /// a failure here is a programming error and data is left empty.
    pub fn new(kind: MessageKind, topic: Option<String>, payload: Option<&impl Serialize>) -> Self {
        let data = payload.and_then(|p| serde_json::to_value(p).ok());
        Self {
            kind,
            topic,
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Bare envelope with no payload.
    pub fn plain(kind: MessageKind, topic: Option<String>) -> Self {
        Self::new(kind, topic, None::<&()>)
    }

    /// Error envelope with a machine-readable code.
    pub fn error(code: &str, message: &str) -> Self {
        Self::new(
            MessageKind::Error,
            None,
            Some(&ErrorPayload {
                code: code.to_string(),
                message: message.to_string(),
            }),
        )
    }

    /// Parse an inbound text frame.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// `PRICE_UPDATE` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePayload {
    pub symbol: Symbol,
    pub price: Price,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Price>,
    pub change: Decimal,
    pub change_percent: Decimal,
    pub volume: i64,
}

/// `ORDER_UPDATE` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub order_id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub status: OrderStatus,
    pub filled_qty: Quantity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_price: Option<Price>,
}

/// `TRADE_UPDATE` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradePayload {
    pub trade_id: String,
    pub order_id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Quantity,
    pub price: Price,
    pub commission: Decimal,
}

/// `ERROR` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}
