//! State, journal and remote-sync locations.

use serde::{Deserialize, Serialize};

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding `{strategy}_{mode}_state.json` files.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    /// Directory holding `trade_log_{strategy}.csv` files.
    #[serde(default = "default_journal_dir")]
    pub journal_dir: String,
    /// Push state files to a git remote after each save.
    #[serde(default)]
    pub git_sync_enabled: bool,
    /// Git remote name.
    #[serde(default = "default_git_remote")]
    pub git_remote: String,
    /// Git branch name.
    #[serde(default = "default_git_branch")]
    pub git_branch: String,
    /// Commit message for state pushes.
    #[serde(default = "default_git_commit_message")]
    pub git_commit_message: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            journal_dir: default_journal_dir(),
            git_sync_enabled: false,
            git_remote: default_git_remote(),
            git_branch: default_git_branch(),
            git_commit_message: default_git_commit_message(),
        }
    }
}

fn default_state_dir() -> String {
    "state".to_string()
}

fn default_journal_dir() -> String {
    "journal".to_string()
}

fn default_git_remote() -> String {
    "origin".to_string()
}

fn default_git_branch() -> String {
    "main".to_string()
}

fn default_git_commit_message() -> String {
    "Update strategy state".to_string()
}
