//! Market Feed Port (Driven Port)
//!
//! Source of raw per-tick market data. The runner turns each frame into a
//! bucketed [`MarketSnapshot`](crate::domain::market::MarketSnapshot).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::{GreeksQuote, OptionChainEntry, RawPositionRow};

/// One tick of raw market data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedFrame {
    /// Exchange-local time of the tick.
    pub now: NaiveDateTime,
    /// Underlying spot.
    pub spot: Decimal,
    /// Chain entries across all listed expiries.
    #[serde(default)]
    pub chain: Vec<OptionChainEntry>,
    /// Last prices by instrument key.
    #[serde(default)]
    pub quotes: HashMap<String, Decimal>,
    /// Greeks by instrument key.
    #[serde(default)]
    pub greeks: HashMap<String, GreeksQuote>,
    /// Broker positions carried with the frame (replays).
    #[serde(default)]
    pub positions: Option<Vec<RawPositionRow>>,
}

/// Feed errors.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Source could not be read.
    #[error("Feed I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame could not be decoded.
    #[error("Feed decode error at line {line}: {message}")]
    Decode {
        /// Line or frame number.
        line: usize,
        /// Error details.
        message: String,
    },

    /// Remote source failed.
    #[error("Feed request failed: {message}")]
    Request {
        /// Error details.
        message: String,
    },
}

/// Port for market data.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Next frame, or `None` when the source is exhausted.
    async fn next_frame(&self) -> Result<Option<FeedFrame>, FeedError>;
}
