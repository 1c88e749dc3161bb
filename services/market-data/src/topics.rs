//! Topic namespace
//!
//! Topics are strings with a fixed, closed set of prefixes. `price:` is
//! public; `order:`, `trade:`, and `portfolio:` are scoped to one user and
//! require authorization. Anything else is rejected at the boundary.

use std::fmt;
use types::ids::{Symbol, UserId};

pub const PRICE_PREFIX: &str = "price:";
pub const ORDER_PREFIX: &str = "order:";
pub const TRADE_PREFIX: &str = "trade:";
pub const PORTFOLIO_PREFIX: &str = "portfolio:";

/// A parsed, known-valid topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Public price stream for one symbol.
    Price(Symbol),
    /// A user's order updates.
    Order(String),
    /// A user's trade updates.
    Trade(String),
    /// A user's portfolio updates.
    Portfolio(String),
}

impl Topic {
    /// Parse a raw topic string against the closed prefix set.
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(symbol) = raw.strip_prefix(PRICE_PREFIX) {
            return Symbol::try_new(symbol).map(Topic::Price);
        }
        if let Some(user) = raw.strip_prefix(ORDER_PREFIX) {
            return non_empty(user).map(Topic::Order);
        }
        if let Some(user) = raw.strip_prefix(TRADE_PREFIX) {
            return non_empty(user).map(Topic::Trade);
        }
        if let Some(user) = raw.strip_prefix(PORTFOLIO_PREFIX) {
            return non_empty(user).map(Topic::Portfolio);
        }
        None
    }

    /// True for topics scoped to a single user.
    pub fn is_user_topic(&self) -> bool {
        !matches!(self, Topic::Price(_))
    }

    /// The user-id suffix of a private topic.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Topic::Price(_) => None,
            Topic::Order(user) | Topic::Trade(user) | Topic::Portfolio(user) => Some(user),
        }
    }

    /// The symbol suffix of a price topic.
    pub fn symbol(&self) -> Option<&Symbol> {
        match self {
            Topic::Price(symbol) => Some(symbol),
            _ => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Price(symbol) => write!(f, "{PRICE_PREFIX}{symbol}"),
            Topic::Order(user) => write!(f, "{ORDER_PREFIX}{user}"),
            Topic::Trade(user) => write!(f, "{TRADE_PREFIX}{user}"),
            Topic::Portfolio(user) => write!(f, "{PORTFOLIO_PREFIX}{user}"),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// `price:<symbol>`
pub fn price(symbol: &Symbol) -> String {
    format!("{PRICE_PREFIX}{symbol}")
}

/// `order:<user>`
pub fn order(user: &UserId) -> String {
    format!("{ORDER_PREFIX}{user}")
}

/// `trade:<user>`
pub fn trade(user: &UserId) -> String {
    format!("{TRADE_PREFIX}{user}")
}

/// `portfolio:<user>`
pub fn portfolio(user: &UserId) -> String {
    format!("{PORTFOLIO_PREFIX}{user}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price_topic() {
        let topic = Topic::parse("price:AAPL").unwrap();
        assert_eq!(topic, Topic::Price(Symbol::new("AAPL")));
        assert!(!topic.is_user_topic());
        assert_eq!(topic.symbol().unwrap().as_str(), "AAPL");
        assert_eq!(topic.to_string(), "price:AAPL");
    }

    #[test]
    fn test_parse_user_topics() {
        for raw in ["order:u1", "trade:u1", "portfolio:u1"] {
            let topic = Topic::parse(raw).unwrap();
            assert!(topic.is_user_topic(), "{raw} is user scoped");
            assert_eq!(topic.user_id(), Some("u1"));
            assert_eq!(topic.to_string(), raw);
        }
    }

    #[test]
    fn test_rejects_unknown_and_empty() {
        assert!(Topic::parse("candles:AAPL").is_none());
        assert!(Topic::parse("price:").is_none());
        assert!(Topic::parse("order:").is_none());
        assert!(Topic::parse("").is_none());
        assert!(Topic::parse("priceAAPL").is_none());
    }

    #[test]
    fn test_constructors_roundtrip() {
        let user = UserId::new();
        let raw = order(&user);
        let topic = Topic::parse(&raw).unwrap();
        assert_eq!(topic.user_id(), Some(user.to_string().as_str()));
    }
}
