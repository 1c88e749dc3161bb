//! Order admission
//!
//! Validates a new order request and runs the funding checks before the
//! order may reach the book: BUY orders need cash for the estimated cost
//! plus commission, SELL orders need the shares. Orders rejected here
//! never enter the matching engine, which is what lets settlement treat
//! funding failures as invariant violations.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;

use persistence::{AccountStore, PositionStore, StoreError};
use types::ids::{AccountId, PortfolioId, Symbol, UserId};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderType, Side, TimeInForce};

/// Reference price source for orders without a limit price.
///
/// Backed by the market relay's last-price table; tests plug in fixtures.
pub trait ReferencePrices: Send + Sync {
    fn last_price(&self, symbol: &Symbol) -> Option<Price>;
}

/// Reference source with no data; MARKET orders cannot be admitted.
pub struct NoReferencePrices;

impl ReferencePrices for NoReferencePrices {
    fn last_price(&self, _symbol: &Symbol) -> Option<Price> {
        None
    }
}

/// A new order request, unvalidated.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub account_id: AccountId,
    pub portfolio_id: PortfolioId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: Option<TimeInForce>,
}

/// Rejections produced before an order reaches the book.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdmissionError {
    #[error("invalid order type: {0}")]
    InvalidOrderType(String),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    #[error("insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: String, held: String },

    #[error("account does not belong to the submitting user")]
    Unauthorized,

    #[error(transparent)]
    Store(StoreError),
}

/// Admission checks over the storage interfaces.
pub struct Admission {
    accounts: Arc<dyn AccountStore>,
    positions: Arc<dyn PositionStore>,
    reference: Arc<dyn ReferencePrices>,
    commission_rate: Decimal,
}

impl Admission {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        positions: Arc<dyn PositionStore>,
        reference: Arc<dyn ReferencePrices>,
        commission_rate: Decimal,
    ) -> Self {
        Self {
            accounts,
            positions,
            reference,
            commission_rate,
        }
    }

    /// Validate a request and, if it passes, produce the PENDING order.
    pub fn admit(&self, new: NewOrder, timestamp: i64) -> Result<Order, AdmissionError> {
        let quantity = Quantity::try_new(new.quantity)
            .ok_or_else(|| AdmissionError::InvalidQuantity(new.quantity.to_string()))?;

        let limit_price = match new.order_type {
            OrderType::LIMIT => Some(require_price(new.limit_price, "limit")?),
            // A stop order may carry a limit for its re-submitted twin.
            OrderType::STOP => new.limit_price.and_then(Price::try_new),
            OrderType::MARKET => None,
        };
        let stop_price = match new.order_type {
            OrderType::STOP => Some(require_price(new.stop_price, "stop")?),
            _ => None,
        };

        let account = self.accounts.get(&new.account_id).map_err(|err| match err {
            StoreError::NotFound { .. } => AdmissionError::Unauthorized,
            other => AdmissionError::Store(other),
        })?;
        if account.user_id != new.user_id {
            return Err(AdmissionError::Unauthorized);
        }

        match new.side {
            Side::BUY => {
                let reference = limit_price
                    .or(stop_price)
                    .or_else(|| self.reference.last_price(&new.symbol))
                    .ok_or_else(|| {
                        AdmissionError::InvalidOrderType(
                            "no reference price available for market order".to_string(),
                        )
                    })?;
                let required = quantity.as_decimal()
                    * reference.as_decimal()
                    * (Decimal::ONE + self.commission_rate);
                if account.balance < required {
                    return Err(AdmissionError::InsufficientBalance {
                        required: required.to_string(),
                        available: account.balance.to_string(),
                    });
                }
            }
            Side::SELL => {
                let held = self
                    .positions
                    .get(&new.portfolio_id, &new.symbol)
                    .map(|p| p.quantity.as_decimal())
                    .unwrap_or_default();
                if held < quantity.as_decimal() {
                    return Err(AdmissionError::InsufficientShares {
                        requested: quantity.to_string(),
                        held: held.to_string(),
                    });
                }
            }
        }

        Ok(Order::new(
            new.user_id,
            new.account_id,
            new.portfolio_id,
            new.symbol,
            new.side,
            new.order_type,
            limit_price,
            stop_price,
            quantity,
            new.time_in_force.unwrap_or_default(),
            timestamp,
        ))
    }
}

fn require_price(value: Option<Decimal>, which: &str) -> Result<Price, AdmissionError> {
    value.and_then(Price::try_new).ok_or_else(|| {
        AdmissionError::InvalidOrderType(format!("{which} order requires a positive {which} price"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::{MemoryAccountStore, MemoryPositionStore};
    use types::account::Account;
    use types::order::OrderStatus;
    use types::position::Position;

    struct Fixture {
        admission: Admission,
        user_id: UserId,
        account_id: AccountId,
        portfolio_id: PortfolioId,
        positions: Arc<MemoryPositionStore>,
    }

    fn fixture(balance: u64) -> Fixture {
        let accounts = Arc::new(MemoryAccountStore::new());
        let positions = Arc::new(MemoryPositionStore::new());
        let account = Account::new(UserId::new(), Decimal::from(balance), 1);
        let user_id = account.user_id;
        let account_id = account.account_id;
        accounts.insert(account).unwrap();

        Fixture {
            admission: Admission::new(
                accounts,
                positions.clone(),
                Arc::new(NoReferencePrices),
                Decimal::new(1, 3),
            ),
            user_id,
            account_id,
            portfolio_id: PortfolioId::new(),
            positions,
        }
    }

    fn request(f: &Fixture, side: Side, order_type: OrderType, qty: u64) -> NewOrder {
        NewOrder {
            user_id: f.user_id,
            account_id: f.account_id,
            portfolio_id: f.portfolio_id,
            symbol: Symbol::new("AAPL"),
            side,
            order_type,
            quantity: Decimal::from(qty),
            limit_price: None,
            stop_price: None,
            time_in_force: None,
        }
    }

    #[test]
    fn test_limit_buy_admitted() {
        let f = fixture(10_000);
        let mut new = request(&f, Side::BUY, OrderType::LIMIT, 10);
        new.limit_price = Some(Decimal::from(150));

        let order = f.admission.admit(new, 1).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.limit_price, Some(Price::from_u64(150)));
        assert_eq!(order.time_in_force, TimeInForce::GTC);
    }

    #[test]
    fn test_limit_requires_price() {
        let f = fixture(10_000);
        let new = request(&f, Side::BUY, OrderType::LIMIT, 10);
        assert!(matches!(
            f.admission.admit(new, 1),
            Err(AdmissionError::InvalidOrderType(_))
        ));
    }

    #[test]
    fn test_stop_requires_stop_price() {
        let f = fixture(10_000);
        let new = request(&f, Side::BUY, OrderType::STOP, 10);
        assert!(matches!(
            f.admission.admit(new, 1),
            Err(AdmissionError::InvalidOrderType(_))
        ));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let f = fixture(10_000);
        let mut new = request(&f, Side::BUY, OrderType::LIMIT, 10);
        new.quantity = Decimal::ZERO;
        assert!(matches!(
            f.admission.admit(new, 1),
            Err(AdmissionError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn test_buy_balance_includes_commission() {
        // 10 × 100 = 1000 gross; the commission makes it 1001.
        let f = fixture(1000);
        let mut new = request(&f, Side::BUY, OrderType::LIMIT, 10);
        new.limit_price = Some(Decimal::from(100));

        assert!(matches!(
            f.admission.admit(new, 1),
            Err(AdmissionError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_market_buy_needs_reference_price() {
        let f = fixture(10_000);
        let new = request(&f, Side::BUY, OrderType::MARKET, 10);
        assert!(matches!(
            f.admission.admit(new, 1),
            Err(AdmissionError::InvalidOrderType(_))
        ));
    }

    #[test]
    fn test_sell_requires_shares() {
        let f = fixture(10_000);
        let mut new = request(&f, Side::SELL, OrderType::LIMIT, 10);
        new.limit_price = Some(Decimal::from(100));

        assert!(matches!(
            f.admission.admit(new.clone(), 1),
            Err(AdmissionError::InsufficientShares { .. })
        ));

        f.positions.upsert(Position::open(
            f.portfolio_id,
            Symbol::new("AAPL"),
            Quantity::from_u64(10),
            Price::from_u64(90),
            1,
        ));
        assert!(f.admission.admit(new, 2).is_ok());
    }

    #[test]
    fn test_foreign_account_unauthorized() {
        let f = fixture(10_000);
        let mut new = request(&f, Side::BUY, OrderType::LIMIT, 10);
        new.limit_price = Some(Decimal::from(100));
        new.user_id = UserId::new(); // not the account owner

        assert_eq!(f.admission.admit(new, 1), Err(AdmissionError::Unauthorized));
    }
}
