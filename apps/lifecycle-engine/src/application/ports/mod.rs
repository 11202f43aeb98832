//! Application Ports (Driven)
//!
//! Interfaces the lifecycle engine uses to reach the outside world. Each
//! port has a production adapter under `infrastructure` and an in-memory
//! or mock implementation for tests.

mod broker_api_port;
mod execution_port;
mod journal_port;
mod market_feed_port;
mod persistence_port;
mod sync_port;

pub use broker_api_port::{BrokerApi, BrokerApiError, CancelOutcome, OrderState, OrderStatusReport};
#[cfg(test)]
pub use broker_api_port::MockBrokerApi;
pub use execution_port::{ExecutionError, ExecutionPort, Fill, OrderRequest, PositionSource};
pub use journal_port::{JournalError, RecordOutcome, TradeJournal, TradeRecord};
pub use market_feed_port::{FeedError, FeedFrame, MarketFeed};
pub use persistence_port::{PersistenceError, StatePersistence};
pub use sync_port::{NoOpStateSync, StateSync, SyncError};

#[cfg(test)]
pub use execution_port::MockExecutionPort;
#[cfg(test)]
pub use journal_port::MockTradeJournal;
#[cfg(test)]
pub use persistence_port::MockStatePersistence;
