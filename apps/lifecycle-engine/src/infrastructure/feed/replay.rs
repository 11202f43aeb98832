//! JSON-lines replay feed.
//!
//! Each non-blank line is one [`FeedFrame`]. A line that fails to decode is
//! reported with its line number and skipped; the next call moves on.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::Mutex;

use crate::application::ports::{FeedError, FeedFrame, MarketFeed};

struct Cursor {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

/// Feed that replays frames from a file.
pub struct ReplayFeed {
    cursor: Mutex<Cursor>,
}

impl ReplayFeed {
    /// Open `path` for replay.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let file = File::open(path.as_ref()).await?;
        tracing::info!(path = %path.as_ref().display(), "Replaying market frames");
        Ok(Self {
            cursor: Mutex::new(Cursor {
                lines: BufReader::new(file).lines(),
                line_no: 0,
            }),
        })
    }
}

#[async_trait]
impl MarketFeed for ReplayFeed {
    async fn next_frame(&self) -> Result<Option<FeedFrame>, FeedError> {
        let mut cursor = self.cursor.lock().await;
        loop {
            let Some(line) = cursor.lines.next_line().await? else {
                return Ok(None);
            };
            cursor.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            return serde_json::from_str(&line)
                .map(Some)
                .map_err(|e| FeedError::Decode {
                    line: cursor.line_no,
                    message: e.to_string(),
                });
        }
    }
}
