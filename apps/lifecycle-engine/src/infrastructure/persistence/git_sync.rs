//! Git state sync.
//!
//! Replicates the state directory to a git remote so a second machine can
//! pick up where this one stopped. Saves enqueue a request on a bounded
//! channel; a background task runs `git add`/`commit`/`push`. Failures are
//! logged and never reach the controller.

use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{StateSync, SyncError};
use crate::config::PersistenceConfig;

const QUEUE_CAPACITY: usize = 64;
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Where and how to push.
#[derive(Debug, Clone)]
pub struct GitSyncSettings {
    /// Repository working directory.
    pub workdir: PathBuf,
    /// Path (relative to `workdir`) that is staged on every sync.
    pub path: PathBuf,
    /// Remote name.
    pub remote: String,
    /// Branch name.
    pub branch: String,
    /// Commit message prefix.
    pub commit_message: String,
}

impl From<&PersistenceConfig> for GitSyncSettings {
    fn from(config: &PersistenceConfig) -> Self {
        Self {
            workdir: PathBuf::from("."),
            path: PathBuf::from(&config.state_dir),
            remote: config.git_remote.clone(),
            branch: config.git_branch.clone(),
            commit_message: config.git_commit_message.clone(),
        }
    }
}

/// Queue-backed `StateSync`.
#[derive(Debug, Clone)]
pub struct GitStateSync {
    tx: mpsc::Sender<String>,
}

impl GitStateSync {
    /// Start the background worker. It stops when `shutdown` is cancelled,
    /// after one last push of anything still queued.
    pub fn spawn(settings: GitSyncSettings, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let handle = tokio::spawn(run_worker(settings, rx, shutdown));
        (Self { tx }, handle)
    }
}

impl StateSync for GitStateSync {
    fn request_sync(&self, reason: &str) -> Result<(), SyncError> {
        match self.tx.try_send(reason.to_string()) {
            Ok(()) => Ok(()),
            // A queued request stages the whole directory, so this one is covered.
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(reason, "Sync queue full; request coalesced");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SyncError::QueueClosed),
        }
    }
}

async fn run_worker(settings: GitSyncSettings, mut rx: mpsc::Receiver<String>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            request = rx.recv() => match request {
                Some(reason) => push_logged(&settings, &reason).await,
                None => return,
            },
        }
    }

    rx.close();
    let mut last = None;
    while let Ok(reason) = rx.try_recv() {
        last = Some(reason);
    }
    if let Some(reason) = last {
        push_logged(&settings, &reason).await;
    }
}

async fn push_logged(settings: &GitSyncSettings, reason: &str) {
    match push(settings, reason).await {
        Ok(true) => tracing::info!(reason, remote = %settings.remote, "State pushed"),
        Ok(false) => tracing::debug!(reason, "No state changes to push"),
        Err(e) => tracing::warn!(reason, error = %e, "State push failed"),
    }
}

/// Stage, commit and push the state path. Returns `false` when there was
/// nothing to commit.
pub async fn push(settings: &GitSyncSettings, reason: &str) -> Result<bool, SyncError> {
    let path = settings.path.to_string_lossy().into_owned();
    git(settings, &["add", &path]).await?;

    let status = git(settings, &["status", "--porcelain", &path]).await?;
    if status.trim().is_empty() {
        return Ok(false);
    }

    let message = format!("{}: {reason}", settings.commit_message);
    git(settings, &["commit", "-m", &message]).await?;
    git(settings, &["push", &settings.remote, &settings.branch]).await?;
    Ok(true)
}

/// Fetch and rebase onto the remote branch before state is loaded.
pub async fn pull(settings: &GitSyncSettings) -> Result<(), SyncError> {
    git(settings, &["fetch", &settings.remote]).await?;
    git(settings, &["pull", "--rebase", &settings.remote, &settings.branch]).await?;
    tracing::info!(remote = %settings.remote, branch = %settings.branch, "State pulled");
    Ok(())
}

async fn git(settings: &GitSyncSettings, args: &[&str]) -> Result<String, SyncError> {
    let command = args.first().copied().unwrap_or_default();
    let output = tokio::time::timeout(
        COMMAND_TIMEOUT,
        Command::new("git")
            .args(args)
            .current_dir(&settings.workdir)
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| SyncError::CommandFailed {
        message: format!("git {command} timed out"),
    })?
    .map_err(|e| SyncError::CommandFailed {
        message: format!("git {command}: {e}"),
    })?;

    if !output.status.success() {
        return Err(SyncError::CommandFailed {
            message: format!(
                "git {command} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(workdir: PathBuf) -> GitSyncSettings {
        GitSyncSettings {
            workdir,
            path: PathBuf::from("state"),
            remote: "origin".to_string(),
            branch: "main".to_string(),
            commit_message: "Update strategy state".to_string(),
        }
    }

    #[test]
    fn test_settings_from_config() {
        let settings = GitSyncSettings::from(&PersistenceConfig::default());
        assert_eq!(settings.path, PathBuf::from("state"));
        assert_eq!(settings.remote, "origin");
        assert_eq!(settings.branch, "main");
    }

    #[tokio::test]
    async fn test_push_outside_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("state")).unwrap();

        let err = push(&settings(dir.path().to_path_buf()), "calendar")
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_request_after_shutdown_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = CancellationToken::new();
        let (sync, handle) = GitStateSync::spawn(settings(dir.path().to_path_buf()), shutdown.clone());

        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(sync.request_sync("calendar"), Err(SyncError::QueueClosed));
    }

    #[tokio::test]
    async fn test_full_queue_coalesces() {
        let (tx, _rx) = mpsc::channel(1);
        let sync = GitStateSync { tx };

        assert_eq!(sync.request_sync("calendar"), Ok(()));
        assert_eq!(sync.request_sync("ironfly"), Ok(()));
    }
}
