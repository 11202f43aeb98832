//! Paper Broker
//!
//! Simulated execution for PAPER mode. Every order fills at once at the
//! price the controller observed, so local state stays authoritative.

use async_trait::async_trait;
use uuid::Uuid;

use crate::application::ports::{ExecutionError, ExecutionPort, Fill, OrderRequest, PositionSource};
use crate::domain::market::BrokerSnapshot;

/// Immediate-fill execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaperExecution;

#[async_trait]
impl ExecutionPort for PaperExecution {
    async fn execute(&self, request: OrderRequest) -> Result<Fill, ExecutionError> {
        let price = request.reference_price.unwrap_or_default();
        let order_id = format!("PAPER-{}", Uuid::new_v4());
        tracing::info!(
            order_id = %order_id,
            instrument_key = %request.instrument_key,
            side = request.side.as_str(),
            quantity = request.quantity,
            price = %price,
            tag = %request.tag,
            "Paper order filled"
        );
        Ok(Fill::confirmed(price, Some(order_id)))
    }
}

/// Position source for PAPER mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaperPositions {
    report_empty: bool,
}

impl PaperPositions {
    /// With `report_empty`, reconciliation sees an empty book instead of
    /// being skipped.
    #[must_use]
    pub const fn new(report_empty: bool) -> Self {
        Self { report_empty }
    }
}

#[async_trait]
impl PositionSource for PaperPositions {
    async fn snapshot(&self) -> BrokerSnapshot {
        if self.report_empty {
            BrokerSnapshot::Available(Vec::new())
        } else {
            BrokerSnapshot::Unavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::leg::Side;

    fn order(reference_price: Option<Decimal>) -> OrderRequest {
        OrderRequest {
            instrument_key: "NSE_FO|45001".to_string(),
            quantity: 130,
            side: Side::Buy,
            tag: "algo_batman_ENTRY".to_string(),
            expiry: None,
            reference_price,
        }
    }

    #[tokio::test]
    async fn test_fills_at_reference_price() {
        let fill = PaperExecution.execute(order(Some(dec!(42.35)))).await.unwrap();

        assert_eq!(fill.avg_price, dec!(42.35));
        assert!(!fill.ambiguous);
        assert!(fill.order_id.unwrap().starts_with("PAPER-"));
    }

    #[tokio::test]
    async fn test_unknown_price_fills_at_zero() {
        let fill = PaperExecution.execute(order(None)).await.unwrap();
        assert_eq!(fill.avg_price, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_positions_unavailable_by_default() {
        assert_eq!(PaperPositions::default().snapshot().await, BrokerSnapshot::Unavailable);
        assert_eq!(
            PaperPositions::new(true).snapshot().await,
            BrokerSnapshot::Available(Vec::new())
        );
    }
}
