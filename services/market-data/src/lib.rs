//! Market data service
//!
//! The real-time event plumbing: typed message envelopes, the closed topic
//! namespace, the in-process pub/sub bus, the bounded per-subscriber
//! outbound queue, and the upstream trade-feed relay that turns external
//! trades into `price:<symbol>` events.

pub mod backpressure;
pub mod bus;
pub mod envelope;
pub mod relay;
pub mod topics;

pub use backpressure::{OutboundQueue, OverflowPolicy, QueueOverflow};
pub use bus::{Deliver, EventBus};
pub use envelope::{
    Envelope, ErrorPayload, MessageKind, OrderPayload, ParseError, PricePayload, TradePayload,
};
pub use relay::PriceRelay;
pub use topics::Topic;
