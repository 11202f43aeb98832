//! State Sync Port (Driven Port)
//!
//! Fire-and-forget replication of persisted state to a remote store.

/// Sync errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The background worker is gone.
    #[error("Sync queue closed")]
    QueueClosed,

    /// A sync command failed.
    #[error("Sync command failed: {message}")]
    CommandFailed {
        /// Error details.
        message: String,
    },
}

/// Port for requesting a state sync. Never blocks the caller.
pub trait StateSync: Send + Sync {
    /// Enqueue a sync request.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::QueueClosed`] if the worker has stopped.
    fn request_sync(&self, reason: &str) -> Result<(), SyncError>;
}

/// Sync that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStateSync;

impl StateSync for NoOpStateSync {
    fn request_sync(&self, _reason: &str) -> Result<(), SyncError> {
        Ok(())
    }
}
