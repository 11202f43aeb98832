//! JSON file state store.
//!
//! One file per strategy and mode: `{state_dir}/{strategy}_{mode}_state.json`.
//! Writes go to a sibling temp file that is then renamed over the target, so
//! a crash mid-write leaves the previous snapshot intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::application::ports::{PersistenceError, StatePersistence};

/// File-backed implementation of `StatePersistence`.
#[derive(Debug, Clone)]
pub struct JsonFileStatePersistence {
    dir: PathBuf,
}

impl JsonFileStatePersistence {
    /// Store snapshots under `dir` (created on first save).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the snapshot for `strategy` in `mode`.
    #[must_use]
    pub fn path_for(&self, strategy: &str, mode: &str) -> PathBuf {
        self.dir.join(format!("{strategy}_{mode}_state.json"))
    }

    /// Snapshot directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl StatePersistence for JsonFileStatePersistence {
    async fn save(&self, strategy: &str, mode: &str, state: &Value) -> Result<(), PersistenceError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(strategy, mode);
        let temp_path = path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&temp_path, &bytes).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        tracing::debug!(strategy, mode, path = %path.display(), "State saved");
        Ok(())
    }

    async fn load(&self, strategy: &str, mode: &str) -> Result<Option<Value>, PersistenceError> {
        let path = self.path_for(strategy, mode);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStatePersistence::new(dir.path().join("state"));
        let state = json!({"legs": {}, "adjustment_count": 2});

        store.save("calendar", "live", &state).await.unwrap();

        assert!(dir.path().join("state/calendar_live_state.json").exists());
        assert_eq!(store.load("calendar", "live").await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStatePersistence::new(dir.path());

        assert_eq!(store.load("batman", "paper").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_modes_are_kept_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStatePersistence::new(dir.path());

        store.save("ironfly", "paper", &json!({"mode": "paper"})).await.unwrap();
        store.save("ironfly", "live", &json!({"mode": "live"})).await.unwrap();

        assert_eq!(
            store.load("ironfly", "paper").await.unwrap(),
            Some(json!({"mode": "paper"}))
        );
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStatePersistence::new(dir.path());

        store.save("calendar", "paper", &json!({"v": 1})).await.unwrap();
        store.save("calendar", "paper", &json!({"v": 2})).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["calendar_paper_state.json".to_string()]);
        assert_eq!(
            store.load("calendar", "paper").await.unwrap(),
            Some(json!({"v": 2}))
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("calendar_paper_state.json"), "{not json").unwrap();
        let store = JsonFileStatePersistence::new(dir.path());

        let err = store.load("calendar", "paper").await.unwrap_err();

        assert!(matches!(err, PersistenceError::Serialization(_)));
    }
}
