//! Execution Port (Driven Port)
//!
//! Submit one order and wait for its outcome. A successful return means the
//! position is reflected at the brokerage; nothing is atomic across calls.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::leg::Side;
use crate::domain::market::BrokerSnapshot;

/// Order to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Broker instrument identifier.
    pub instrument_key: String,
    /// Absolute quantity in units.
    pub quantity: u32,
    /// Buy or sell.
    pub side: Side,
    /// Free-form tag carried to the broker and journal.
    pub tag: String,
    /// Contract expiry.
    pub expiry: Option<NaiveDate>,
    /// Price to assume when the gateway cannot observe one (paper fills).
    pub reference_price: Option<Decimal>,
}

/// Result of a filled order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Average fill price.
    pub avg_price: Decimal,
    /// Broker order id, if any.
    pub order_id: Option<String>,
    /// Final state could not be confirmed; treated as filled.
    pub ambiguous: bool,
}

impl Fill {
    /// Confirmed fill.
    #[must_use]
    pub const fn confirmed(avg_price: Decimal, order_id: Option<String>) -> Self {
        Self {
            avg_price,
            order_id,
            ambiguous: false,
        }
    }
}

/// Execution failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// Network or rate-limit failure that survived every retry.
    #[error("Transient failure after {attempts} attempts: {message}")]
    Transient {
        /// Attempts made.
        attempts: u32,
        /// Last error.
        message: String,
    },

    /// Broker rejected or cancelled the order.
    #[error("Order rejected: {reason}")]
    Rejected {
        /// Rejection reason.
        reason: String,
    },

    /// Order did not fill in time and was cancelled.
    #[error("Order {order_id} timed out and was cancelled")]
    Timeout {
        /// Broker order id.
        order_id: String,
    },

    /// Request could not be formed or sent.
    #[error("Execution unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },
}

/// Port for order execution.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionPort: Send + Sync {
    /// Execute an order to completion.
    async fn execute(&self, request: OrderRequest) -> Result<Fill, ExecutionError>;
}

/// Port for reading broker positions.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Current positions, or [`BrokerSnapshot::Unavailable`] when they cannot be read.
    async fn snapshot(&self) -> BrokerSnapshot;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_display() {
        let err = ExecutionError::Rejected {
            reason: "margin".to_string(),
        };
        assert_eq!(err.to_string(), "Order rejected: margin");
    }

    #[tokio::test]
    async fn test_mock_execution_port() {
        let mut mock = MockExecutionPort::new();
        mock.expect_execute()
            .returning(|_| Ok(Fill::confirmed(dec!(101.5), Some("1".to_string()))));
        let fill = mock
            .execute(OrderRequest {
                instrument_key: "NSE_FO|1".to_string(),
                quantity: 65,
                side: Side::Buy,
                tag: "T".to_string(),
                expiry: None,
                reference_price: None,
            })
            .await
            .unwrap();
        assert_eq!(fill.avg_price, dec!(101.5));
        assert!(!fill.ambiguous);
    }
}
