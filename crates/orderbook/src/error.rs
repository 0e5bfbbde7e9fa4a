//! Order book error types.

use model::Side;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur during order book operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderBookError {
    /// Price is zero or negative.
    #[error("invalid {side} price {price}")]
    InvalidPrice { side: Side, price: Decimal },

    /// Quantity is negative.
    #[error("invalid {side} quantity {quantity} at price {price}")]
    InvalidQuantity {
        side: Side,
        price: Decimal,
        quantity: Decimal,
    },

    /// Snapshot belongs to a bootstrap that is no longer current.
    #[error("snapshot for bootstrap {bootstrap_id} is stale")]
    StaleSnapshot { bootstrap_id: u64 },
}
