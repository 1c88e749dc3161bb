//! Settlement service
//!
//! Admits orders into the system (validation plus balance and share
//! checks) and applies matches to durable state: order fill updates,
//! trade records, account balances, FIFO position lots, and the order
//! and trade events that fan out to the owning users.

pub mod admission;
pub mod settler;
pub mod stripe;

pub use admission::{Admission, AdmissionError, NewOrder, ReferencePrices};
pub use settler::{Settler, SettlementError};
pub use stripe::StripeLock;

use rust_decimal::Decimal;

/// Commission charged on each side of a match: 0.1% of gross.
pub fn commission_rate() -> Decimal {
    Decimal::new(1, 3)
}
