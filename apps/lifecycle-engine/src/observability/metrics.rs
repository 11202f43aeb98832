//! Prometheus metrics for the lifecycle engine.
//!
//! Counters and gauges are recorded through the `metrics` facade; they are
//! no-ops until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The listen address could not be parsed.
    #[error("invalid metrics listen address '{0}'")]
    InvalidAddress(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Start the Prometheus exporter on `listen` (e.g. "0.0.0.0:9100").
pub fn init_metrics(listen: &str) -> Result<(), MetricsError> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|_| MetricsError::InvalidAddress(listen.to_string()))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(addr = %addr, "Prometheus metrics exporter started");
    Ok(())
}

/// Record an order attempt.
///
/// # Arguments
///
/// * `strategy` - Strategy name
/// * `side` - "BUY" or "SELL"
/// * `status` - "filled", "ambiguous" or "failed"
pub fn record_order(strategy: &str, side: &str, status: &str) {
    counter!(
        "lifecycle_orders_total",
        "strategy" => strategy.to_string(),
        "side" => side.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record ledger corrections made by reconciliation.
pub fn record_reconciliation_changes(strategy: &str, changes: usize) {
    counter!(
        "lifecycle_reconciliation_changes_total",
        "strategy" => strategy.to_string()
    )
    .increment(changes as u64);
}

/// Record a controller cycle that failed or panicked.
pub fn record_controller_failure(strategy: &str) {
    counter!(
        "lifecycle_controller_failures_total",
        "strategy" => strategy.to_string()
    )
    .increment(1);
}

/// Record a failed state save.
pub fn record_state_write_failure(strategy: &str) {
    counter!(
        "lifecycle_state_write_failures_total",
        "strategy" => strategy.to_string()
    )
    .increment(1);
}

/// Update the open P&L gauge.
pub fn set_open_pnl(strategy: &str, pnl: f64) {
    gauge!("lifecycle_open_pnl", "strategy" => strategy.to_string()).set(pnl);
}
