//! Shared error taxonomy for the trading core

use thiserror::Error;

/// Cash account errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccountError {
    #[error("account {account_id} is not active")]
    NotActive { account_id: String },

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },
}

/// Position errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionError {
    #[error("insufficient {symbol} quantity: requested {requested}, held {held}")]
    InsufficientQuantity {
        symbol: String,
        requested: String,
        held: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_error_display() {
        let err = AccountError::InsufficientBalance {
            required: "1001".to_string(),
            available: "1000".to_string(),
        };
        assert!(err.to_string().contains("1001"));
        assert!(err.to_string().contains("1000"));
    }
}
