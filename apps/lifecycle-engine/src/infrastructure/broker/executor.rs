//! Order Executor
//!
//! Turns the raw [`BrokerApi`] into the [`ExecutionPort`] the controllers
//! use: place, poll until filled, and on timeout cancel and verify so that
//! an order is never silently left working at the broker.
//!
//! # Fill workflow
//!
//! 1. Place the order, backing off while the broker rate-limits.
//! 2. Poll the status every poll interval. A complete status, or a filled
//!    quantity at least the requested quantity, is a fill. Rejected or
//!    cancelled ends the order.
//! 3. After the last poll, cancel. If the cancel was acknowledged and the
//!    order did not fill meanwhile, report a timeout.
//! 4. If the cancel was refused, re-check the status a few times. An order
//!    still not terminal after that is reported as filled with the
//!    `ambiguous` flag, because a silent fill is worse than a double exit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::rate_limit::{ExponentialBackoff, RateLimiter};
use crate::application::ports::{
    BrokerApi, BrokerApiError, CancelOutcome, ExecutionError, ExecutionPort, Fill, OrderRequest,
    OrderState, OrderStatusReport, PositionSource,
};
use crate::config::{BrokerConfig, RetryConfig};
use crate::domain::market::{BrokerSnapshot, normalize_row};

/// Timing and retry settings for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Backoff policy for rate-limited calls.
    pub retry: RetryConfig,
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Polls before the order is cancelled.
    pub max_polls: u32,
    /// Status checks after a refused cancel.
    pub cancel_verify_attempts: u32,
    /// Pause after the cancel and between verification checks.
    pub cancel_settle: Duration,
}

impl From<&BrokerConfig> for ExecutorSettings {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            retry: config.retry.clone(),
            poll_interval: Duration::from_millis(config.fill_poll_interval_ms),
            max_polls: config.max_fill_polls,
            cancel_verify_attempts: config.cancel_verify_attempts,
            cancel_settle: Duration::from_millis(config.cancel_settle_ms),
        }
    }
}

/// Order workflow over a broker API.
pub struct OrderExecutor {
    api: Arc<dyn BrokerApi>,
    limiter: Arc<RateLimiter>,
    settings: ExecutorSettings,
}

impl OrderExecutor {
    /// Create an executor sharing `limiter` with any other broker callers.
    #[must_use]
    pub fn new(api: Arc<dyn BrokerApi>, limiter: Arc<RateLimiter>, settings: ExecutorSettings) -> Self {
        Self {
            api,
            limiter,
            settings,
        }
    }

    async fn place(&self, request: &OrderRequest) -> Result<String, ExecutionError> {
        let mut backoff = ExponentialBackoff::new(&self.settings.retry);
        loop {
            self.limiter.acquire().await;
            let error = match self.api.place_order(request).await {
                Ok(order_id) => return Ok(order_id),
                Err(e) => e,
            };
            match error {
                BrokerApiError::RateLimited { retry_after_secs } => {
                    let Some(delay) = backoff.next_backoff() else {
                        return Err(ExecutionError::Transient {
                            attempts: backoff.attempt() + 1,
                            message: "rate limited".to_string(),
                        });
                    };
                    let delay = retry_after_secs.map_or(delay, Duration::from_secs);
                    tracing::warn!(
                        instrument_key = %request.instrument_key,
                        delay_ms = delay.as_millis() as u64,
                        attempt = backoff.attempt(),
                        "Order placement rate limited; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                // The order may or may not have reached the exchange; never resend blindly.
                BrokerApiError::Network { message } => {
                    return Err(ExecutionError::Transient {
                        attempts: backoff.attempt() + 1,
                        message,
                    });
                }
                BrokerApiError::OrderRejected { reason } => {
                    return Err(ExecutionError::Rejected { reason });
                }
                other => {
                    return Err(ExecutionError::Rejected {
                        reason: other.to_string(),
                    });
                }
            }
        }
    }

    async fn status(&self, order_id: &str) -> Option<OrderStatusReport> {
        self.limiter.acquire().await;
        match self.api.order_status(order_id).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(order_id, error = %e, "Order status check failed");
                None
            }
        }
    }

    async fn resolve_timeout(&self, request: &OrderRequest, order_id: String) -> Result<Fill, ExecutionError> {
        tracing::warn!(order_id = %order_id, "Order not filled in time; cancelling");
        self.limiter.acquire().await;
        let cancel = self.api.cancel_order(&order_id).await;
        tokio::time::sleep(self.settings.cancel_settle).await;

        if let Some(report) = self.status(&order_id).await
            && is_filled(&report, request.quantity)
        {
            tracing::info!(order_id = %order_id, "Order filled during cancellation");
            return Ok(Fill::confirmed(report.average_price, Some(order_id)));
        }

        match cancel {
            Ok(CancelOutcome::Cancelled) => return Err(ExecutionError::Timeout { order_id }),
            Ok(CancelOutcome::NotCancelled { message }) => {
                tracing::warn!(order_id = %order_id, message, "Cancel refused; verifying final status");
            }
            Err(e) => {
                tracing::warn!(order_id = %order_id, error = %e, "Cancel failed; verifying final status");
            }
        }

        let mut last_seen = None;
        for attempt in 1..=self.settings.cancel_verify_attempts {
            tokio::time::sleep(self.settings.cancel_settle).await;
            let Some(report) = self.status(&order_id).await else {
                continue;
            };
            if let Some(outcome) = terminal(&report, request.quantity, &order_id) {
                return outcome;
            }
            tracing::debug!(order_id = %order_id, attempt, state = ?report.state, "Order still working");
            last_seen = Some(report);
        }

        let avg_price = last_seen
            .map(|r| r.average_price)
            .filter(|p| *p > Decimal::ZERO)
            .or(request.reference_price)
            .unwrap_or_default();
        tracing::error!(
            order_id = %order_id,
            instrument_key = %request.instrument_key,
            "Order state unresolved after failed cancel; assuming filled to avoid a double entry"
        );
        Ok(Fill {
            avg_price,
            order_id: Some(order_id),
            ambiguous: true,
        })
    }
}

fn is_filled(report: &OrderStatusReport, quantity: u32) -> bool {
    report.state == OrderState::Complete || (quantity > 0 && report.filled_quantity >= quantity)
}

fn terminal(report: &OrderStatusReport, quantity: u32, order_id: &str) -> Option<Result<Fill, ExecutionError>> {
    if is_filled(report, quantity) {
        return Some(Ok(Fill::confirmed(report.average_price, Some(order_id.to_string()))));
    }
    match report.state {
        OrderState::Rejected => Some(Err(ExecutionError::Rejected {
            reason: report
                .message
                .clone()
                .unwrap_or_else(|| "rejected by broker".to_string()),
        })),
        OrderState::Cancelled => Some(Err(ExecutionError::Rejected {
            reason: format!("order {order_id} cancelled"),
        })),
        OrderState::Open | OrderState::Complete | OrderState::Other(_) => None,
    }
}

#[async_trait]
impl ExecutionPort for OrderExecutor {
    async fn execute(&self, request: OrderRequest) -> Result<Fill, ExecutionError> {
        let order_id = self.place(&request).await?;
        tracing::info!(
            order_id = %order_id,
            instrument_key = %request.instrument_key,
            side = request.side.as_str(),
            quantity = request.quantity,
            tag = %request.tag,
            "Order placed; waiting for fill"
        );

        for _ in 0..self.settings.max_polls {
            tokio::time::sleep(self.settings.poll_interval).await;
            let Some(report) = self.status(&order_id).await else {
                continue;
            };
            if let Some(outcome) = terminal(&report, request.quantity, &order_id) {
                if let Err(e) = &outcome {
                    tracing::error!(order_id = %order_id, error = %e, "Order did not fill");
                }
                return outcome;
            }
        }

        self.resolve_timeout(&request, order_id).await
    }
}

#[async_trait]
impl PositionSource for OrderExecutor {
    async fn snapshot(&self) -> BrokerSnapshot {
        let mut backoff = ExponentialBackoff::new(&self.settings.retry);
        loop {
            self.limiter.acquire().await;
            match self.api.positions().await {
                Ok(rows) => {
                    return BrokerSnapshot::Available(rows.iter().filter_map(normalize_row).collect());
                }
                Err(e) if e.is_retryable() => {
                    let Some(delay) = backoff.next_backoff() else {
                        tracing::warn!(error = %e, "Positions unavailable after retries");
                        return BrokerSnapshot::Unavailable;
                    };
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Positions unavailable");
                    return BrokerSnapshot::Unavailable;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal_macros::dec;

    use super::*;
    use crate::application::ports::MockBrokerApi;
    use crate::domain::leg::Side;
    use crate::domain::market::RawPositionRow;

    fn settings() -> ExecutorSettings {
        ExecutorSettings {
            retry: RetryConfig {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
                backoff_multiplier: 2.0,
                jitter_factor: 0.0,
            },
            poll_interval: Duration::from_millis(1),
            max_polls: 3,
            cancel_verify_attempts: 2,
            cancel_settle: Duration::from_millis(1),
        }
    }

    fn executor(api: MockBrokerApi) -> OrderExecutor {
        OrderExecutor::new(Arc::new(api), Arc::new(RateLimiter::new(Duration::ZERO)), settings())
    }

    fn request() -> OrderRequest {
        OrderRequest {
            instrument_key: "NSE_FO|45001".to_string(),
            quantity: 65,
            side: Side::Sell,
            tag: "algo_calendar_ENTRY".to_string(),
            expiry: None,
            reference_price: Some(dec!(98)),
        }
    }

    fn report(state: OrderState, filled: u32, price: Decimal) -> OrderStatusReport {
        OrderStatusReport {
            state,
            filled_quantity: filled,
            average_price: price,
            message: None,
        }
    }

    #[tokio::test]
    async fn test_complete_status_fills() {
        let mut api = MockBrokerApi::new();
        api.expect_place_order().times(1).returning(|_| Ok("OID1".to_string()));
        api.expect_order_status()
            .returning(|_| Ok(report(OrderState::Complete, 65, dec!(101.5))));

        let fill = executor(api).execute(request()).await.unwrap();

        assert_eq!(fill, Fill::confirmed(dec!(101.5), Some("OID1".to_string())));
    }

    #[tokio::test]
    async fn test_filled_quantity_counts_as_fill() {
        let mut api = MockBrokerApi::new();
        api.expect_place_order().returning(|_| Ok("OID2".to_string()));
        api.expect_order_status()
            .returning(|_| Ok(report(OrderState::Other("put order req received".into()), 65, dec!(99))));

        let fill = executor(api).execute(request()).await.unwrap();

        assert_eq!(fill.avg_price, dec!(99));
        assert!(!fill.ambiguous);
    }

    #[tokio::test]
    async fn test_rejected_status_is_an_error() {
        let mut api = MockBrokerApi::new();
        api.expect_place_order().returning(|_| Ok("OID3".to_string()));
        api.expect_order_status().returning(|_| {
            Ok(OrderStatusReport {
                message: Some("insufficient margin".to_string()),
                ..report(OrderState::Rejected, 0, Decimal::ZERO)
            })
        });

        let err = executor(api).execute(request()).await.unwrap_err();

        assert_eq!(
            err,
            ExecutionError::Rejected {
                reason: "insufficient margin".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_rate_limited_placement_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut api = MockBrokerApi::new();
        api.expect_place_order().returning(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(BrokerApiError::RateLimited { retry_after_secs: None })
            } else {
                Ok("OID4".to_string())
            }
        });
        api.expect_order_status()
            .returning(|_| Ok(report(OrderState::Complete, 65, dec!(100))));

        let fill = executor(api).execute(request()).await.unwrap();

        assert_eq!(fill.order_id.as_deref(), Some("OID4"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion_is_transient() {
        let mut api = MockBrokerApi::new();
        api.expect_place_order()
            .times(4)
            .returning(|_| Err(BrokerApiError::RateLimited { retry_after_secs: None }));

        let err = executor(api).execute(request()).await.unwrap_err();

        assert!(matches!(err, ExecutionError::Transient { attempts: 4, .. }));
    }

    #[tokio::test]
    async fn test_network_error_is_not_resent() {
        let mut api = MockBrokerApi::new();
        api.expect_place_order().times(1).returning(|_| {
            Err(BrokerApiError::Network {
                message: "connection reset".to_string(),
            })
        });

        let err = executor(api).execute(request()).await.unwrap_err();

        assert!(matches!(err, ExecutionError::Transient { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_timeout_with_acknowledged_cancel() {
        let mut api = MockBrokerApi::new();
        api.expect_place_order().returning(|_| Ok("OID5".to_string()));
        api.expect_order_status()
            .returning(|_| Ok(report(OrderState::Open, 0, Decimal::ZERO)));
        api.expect_cancel_order()
            .times(1)
            .returning(|_| Ok(CancelOutcome::Cancelled));

        let err = executor(api).execute(request()).await.unwrap_err();

        assert_eq!(
            err,
            ExecutionError::Timeout {
                order_id: "OID5".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_refused_cancel_then_fill_is_success() {
        let polls = Arc::new(AtomicUsize::new(0));
        let seen = polls.clone();
        let mut api = MockBrokerApi::new();
        api.expect_place_order().returning(|_| Ok("OID6".to_string()));
        // Three polls plus the post-cancel check stay open; the first verify fills.
        api.expect_order_status().returning(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) < 4 {
                Ok(report(OrderState::Open, 0, Decimal::ZERO))
            } else {
                Ok(report(OrderState::Complete, 65, dec!(97)))
            }
        });
        api.expect_cancel_order().returning(|_| {
            Ok(CancelOutcome::NotCancelled {
                message: "already completed".to_string(),
            })
        });

        let fill = executor(api).execute(request()).await.unwrap();

        assert_eq!(fill.avg_price, dec!(97));
        assert!(!fill.ambiguous);
        assert_eq!(polls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_stuck_order_is_reported_as_ambiguous_fill() {
        let mut api = MockBrokerApi::new();
        api.expect_place_order().returning(|_| Ok("OID7".to_string()));
        api.expect_order_status()
            .returning(|_| Ok(report(OrderState::Open, 0, Decimal::ZERO)));
        api.expect_cancel_order().returning(|_| {
            Err(BrokerApiError::Api {
                status: 400,
                message: "cancel window closed".to_string(),
            })
        });

        let fill = executor(api).execute(request()).await.unwrap();

        assert!(fill.ambiguous);
        assert_eq!(fill.avg_price, dec!(98));
        assert_eq!(fill.order_id.as_deref(), Some("OID7"));
    }

    #[tokio::test]
    async fn test_positions_are_normalised() {
        let mut api = MockBrokerApi::new();
        api.expect_positions().returning(|| {
            Ok(vec![
                RawPositionRow {
                    instrument_key: Some("nse_fo|45001".to_string()),
                    trading_symbol: Some("NIFTY2631024000PE".to_string()),
                    net_quantity: -65,
                    average_price: Some(dec!(120)),
                    ..RawPositionRow::default()
                },
                RawPositionRow::default(),
            ])
        });

        let snapshot = executor(api).snapshot().await;

        let rows = snapshot.rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].instrument_key, "NSE_FO|45001");
        assert_eq!(rows[0].strike, dec!(24000));
    }

    #[tokio::test]
    async fn test_positions_failure_is_unavailable() {
        let mut api = MockBrokerApi::new();
        api.expect_positions().times(4).returning(|| {
            Err(BrokerApiError::Network {
                message: "timeout".to_string(),
            })
        });

        assert_eq!(executor(api).snapshot().await, BrokerSnapshot::Unavailable);
    }
}
