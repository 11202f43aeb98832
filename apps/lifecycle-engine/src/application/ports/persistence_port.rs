//! State Persistence Port (Driven Port)
//!
//! Load and save an opaque JSON snapshot per strategy and trading mode.

use async_trait::async_trait;

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Filesystem failure.
    #[error("State I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be (de)serialized.
    #[error("State serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Port for strategy state storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatePersistence: Send + Sync {
    /// Persist a snapshot.
    async fn save(&self, strategy: &str, mode: &str, state: &serde_json::Value) -> Result<(), PersistenceError>;

    /// Load the last snapshot, if any.
    async fn load(&self, strategy: &str, mode: &str) -> Result<Option<serde_json::Value>, PersistenceError>;
}
