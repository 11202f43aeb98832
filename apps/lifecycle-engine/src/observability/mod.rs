//! Observability module for logging and metrics.
//!
//! Tracing is initialised once at process start and the returned guard is
//! held for the lifetime of the binary. Metrics are recorded through the
//! `metrics` facade and exported over HTTP when a listen address is set.

mod metrics;
mod tracing;

pub use self::metrics::{
    MetricsError, init_metrics, record_controller_failure, record_order, record_reconciliation_changes,
    record_state_write_failure, set_open_pnl,
};
pub use self::tracing::{TracingError, TracingGuard, init_tracing};
