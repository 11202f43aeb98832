//! In-memory state store for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::application::ports::{PersistenceError, StatePersistence};

/// In-memory implementation of `StatePersistence`.
///
/// Suitable for testing and dry runs. Nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemoryStatePersistence {
    states: RwLock<HashMap<String, Value>>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

fn slot(strategy: &str, mode: &str) -> String {
    format!("{strategy}_{mode}")
}

impl InMemoryStatePersistence {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a saved state (for test setup).
    pub fn insert(&self, strategy: &str, mode: &str, state: Value) {
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slot(strategy, mode), state);
    }

    /// Saved state, if any.
    #[must_use]
    pub fn get(&self, strategy: &str, mode: &str) -> Option<Value> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&slot(strategy, mode))
            .cloned()
    }

    /// Number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every following save fail with an I/O error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatePersistence for InMemoryStatePersistence {
    async fn save(&self, strategy: &str, mode: &str, state: &Value) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Io(std::io::Error::other("store unavailable")));
        }
        self.insert(strategy, mode, state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, strategy: &str, mode: &str) -> Result<Option<Value>, PersistenceError> {
        Ok(self.get(strategy, mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_and_load_by_strategy_and_mode() {
        let store = InMemoryStatePersistence::new();
        store.save("calendar", "paper", &json!({"adjustment_count": 1})).await.unwrap();

        let loaded = store.load("calendar", "paper").await.unwrap();
        assert_eq!(loaded, Some(json!({"adjustment_count": 1})));
        assert!(store.load("calendar", "live").await.unwrap().is_none());
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_store() {
        let store = InMemoryStatePersistence::new();
        store.set_failing(true);

        let result = store.save("batman", "paper", &json!({})).await;
        assert!(matches!(result, Err(PersistenceError::Io(_))));
        assert_eq!(store.save_count(), 0);
    }
}
