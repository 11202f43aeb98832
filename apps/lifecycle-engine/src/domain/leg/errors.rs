//! Leg Errors

use thiserror::Error;

/// Errors raised while constructing or mutating legs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LegError {
    /// A required field is missing or out of range.
    #[error("Invalid leg field '{field}': {message}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },

    /// Quantity is not a positive multiple of the lot size.
    #[error("Quantity {quantity} is not a positive multiple of lot size {lot_size}")]
    InvalidQuantity {
        /// Offending quantity.
        quantity: u32,
        /// Configured lot size.
        lot_size: u32,
    },
}
