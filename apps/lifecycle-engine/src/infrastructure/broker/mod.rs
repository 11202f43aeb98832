//! Broker Adapters
//!
//! - [`OrderExecutor`]: the LIVE order workflow over any [`BrokerApi`](crate::application::ports::BrokerApi)
//! - [`UpstoxHttpClient`]: the Upstox REST implementation of that API
//! - [`PaperExecution`] / [`PaperPositions`]: simulated fills for PAPER mode
//! - [`RateLimiter`]: the process-wide pacing every broker call goes through

mod executor;
mod paper;
mod rate_limit;
mod upstox;

pub use executor::{ExecutorSettings, OrderExecutor};
pub use paper::{PaperExecution, PaperPositions};
pub use rate_limit::{ExponentialBackoff, RateLimiter};
pub use upstox::UpstoxHttpClient;
