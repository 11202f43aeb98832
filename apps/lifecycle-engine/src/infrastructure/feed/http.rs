//! HTTP snapshot feed.
//!
//! Polls an endpoint that returns one [`FeedFrame`] as JSON per GET. The
//! feed never ends on its own; a failed request is an error for that tick.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::application::ports::{FeedError, FeedFrame, MarketFeed};

/// Feed backed by a market snapshot service.
#[derive(Debug, Clone)]
pub struct HttpSnapshotFeed {
    client: Client,
    url: String,
}

impl HttpSnapshotFeed {
    /// Create a feed polling `url`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Request {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl MarketFeed for HttpSnapshotFeed {
    async fn next_frame(&self) -> Result<Option<FeedFrame>, FeedError> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| FeedError::Request {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Request {
                message: format!("snapshot endpoint returned {status}"),
            });
        }

        let body = response.bytes().await.map_err(|e| FeedError::Request {
            message: e.to_string(),
        })?;
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| FeedError::Decode {
                line: 0,
                message: e.to_string(),
            })
    }
}
