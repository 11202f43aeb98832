//! Market feed source.

use serde::{Deserialize, Serialize};

/// Market feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeedConfig {
    /// Endpoint serving one market frame per GET.
    #[serde(default)]
    pub snapshot_url: Option<String>,
    /// JSON-lines file replayed frame by frame.
    #[serde(default)]
    pub replay_path: Option<String>,
}
