//! Unique identifier types for brokerage entities
//!
//! All entity IDs use UUID v7 so they sort by creation time, which keeps
//! order and trade listings chronological without extra indexes.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new time-sortable identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an order.
    OrderId
);
uuid_id!(
    /// Unique identifier for a trade record.
    TradeId
);
uuid_id!(
    /// Unique identifier for a cash account.
    AccountId
);
uuid_id!(
    /// Unique identifier for a portfolio.
    PortfolioId
);
uuid_id!(
    /// Unique identifier for a user.
    UserId
);

/// Instrument ticker symbol (e.g. "AAPL", "MSFT").
///
/// Uppercase ASCII, non-empty. The symbol doubles as the order-book key and
/// the suffix of `price:` topics, so normalization happens once, here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a new Symbol, normalizing to uppercase.
    ///
    /// # Panics
    /// Panics if the ticker is empty.
    pub fn new(ticker: impl AsRef<str>) -> Self {
        Self::try_new(ticker).expect("symbol must be non-empty")
    }

    /// Try to create a Symbol, returning None for an empty ticker.
    pub fn try_new(ticker: impl AsRef<str>) -> Option<Self> {
        let t = ticker.as_ref().trim();
        if t.is_empty() {
            None
        } else {
            Some(Self(t.to_ascii_uppercase()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
