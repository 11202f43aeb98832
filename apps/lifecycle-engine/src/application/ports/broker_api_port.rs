//! Broker API Port (Driven Port)
//!
//! Raw order placement, status, cancellation and positions. The order
//! executor layers rate limiting, fill polling and timeout handling on top.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::execution_port::OrderRequest;
use crate::domain::market::RawPositionRow;

/// Broker-side order state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderState {
    /// Still working.
    Open,
    /// Fully executed.
    Complete,
    /// Rejected by the exchange or broker.
    Rejected,
    /// Cancelled.
    Cancelled,
    /// Anything else the broker reports.
    Other(String),
}

impl OrderState {
    /// Parse a broker status string.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "complete" | "completed" | "filled" | "traded" => Self::Complete,
            "rejected" => Self::Rejected,
            "cancelled" | "canceled" => Self::Cancelled,
            "open" | "pending" | "trigger pending" | "put order req received"
            | "validation pending" | "open pending" | "modified" => Self::Open,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Snapshot of one order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatusReport {
    /// Order state.
    pub state: OrderState,
    /// Quantity filled so far.
    pub filled_quantity: u32,
    /// Average fill price.
    pub average_price: Decimal,
    /// Broker message, if any.
    pub message: Option<String>,
}

/// Outcome of a cancel request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Broker accepted the cancel.
    Cancelled,
    /// Broker refused or reported an unexpected result.
    NotCancelled {
        /// Broker message.
        message: String,
    },
}

/// Broker API errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerApiError {
    /// Rate limited (HTTP 429).
    #[error("Rate limited, retry after {retry_after_secs:?}s")]
    RateLimited {
        /// Server hint, if given.
        retry_after_secs: Option<u64>,
    },

    /// Network failure or 5xx.
    #[error("Network error: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// Non-retryable API error.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Error details.
        message: String,
    },

    /// Order rejected at placement.
    #[error("Order rejected: {reason}")]
    OrderRejected {
        /// Rejection reason.
        reason: String,
    },

    /// Response body could not be decoded.
    #[error("Decode error: {message}")]
    Decode {
        /// Error details.
        message: String,
    },
}

impl BrokerApiError {
    /// Whether a retry may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network { .. })
    }
}

/// Low-level broker API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerApi: Send + Sync {
    /// Place a market order; returns the broker order id.
    async fn place_order(&self, request: &OrderRequest) -> Result<String, BrokerApiError>;

    /// Current status of an order.
    async fn order_status(&self, order_id: &str) -> Result<OrderStatusReport, BrokerApiError>;

    /// Request cancellation.
    async fn cancel_order(&self, order_id: &str) -> Result<CancelOutcome, BrokerApiError>;

    /// Open positions.
    async fn positions(&self) -> Result<Vec<RawPositionRow>, BrokerApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("complete", OrderState::Complete)]
    #[test_case("Cancelled", OrderState::Cancelled)]
    #[test_case("rejected", OrderState::Rejected)]
    #[test_case("trigger pending", OrderState::Open)]
    #[test_case("after market order req received", OrderState::Other("after market order req received".to_string()))]
    fn test_order_state_parse(raw: &str, expected: OrderState) {
        assert_eq!(OrderState::parse(raw), expected);
    }

    #[test]
    fn test_retryable() {
        assert!(BrokerApiError::RateLimited { retry_after_secs: None }.is_retryable());
        assert!(!BrokerApiError::OrderRejected { reason: "x".into() }.is_retryable());
    }
}
