//! Market Snapshot
//!
//! Read-only per-cycle inputs: spot, option chains per expiry bucket,
//! quotes, Greeks, broker positions and precomputed gating flags.

pub mod chain;
pub mod position_row;
pub mod snapshot;

pub use chain::{ExpiryChain, GreeksQuote, OptionChainEntry};
pub use position_row::{normalize_row, BrokerPositionRow, RawPositionRow};
pub use snapshot::{BrokerSnapshot, ChainSet, MarketFlags, MarketSnapshot};
