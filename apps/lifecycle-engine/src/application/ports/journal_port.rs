//! Trade Journal Port (Driven Port)
//!
//! Append-only record of trades and reconciliation events.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::leg::Side;

/// One journal row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Event time.
    pub timestamp: NaiveDateTime,
    /// Broker instrument identifier.
    pub instrument_key: String,
    /// Side traded.
    pub side: Side,
    /// Absolute quantity.
    pub quantity: u32,
    /// Fill price.
    pub price: Decimal,
    /// Contract expiry.
    pub expiry: Option<NaiveDate>,
    /// Event tag (role plus action).
    pub tag: String,
    /// Booked P&L for closes.
    pub pnl: Option<Decimal>,
}

impl TradeRecord {
    /// Same instrument, tag and calendar day as `other`.
    #[must_use]
    pub fn same_event(&self, other: &Self) -> bool {
        self.instrument_key.eq_ignore_ascii_case(&other.instrument_key)
            && self.tag == other.tag
            && self.timestamp.date() == other.timestamp.date()
    }
}

/// Whether the record was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Appended.
    Written,
    /// Suppressed as a same-day duplicate.
    Duplicate,
}

/// Journal errors.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// Filesystem failure.
    #[error("Journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding failure.
    #[error("Journal CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Port for the trade journal of one strategy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeJournal: Send + Sync {
    /// Append a record. With `dedupe`, a record with the same instrument,
    /// tag and calendar day as an existing one is skipped.
    async fn record(&self, record: TradeRecord, dedupe: bool) -> Result<RecordOutcome, JournalError>;

    /// Sum of booked P&L across all records.
    async fn closed_pnl(&self) -> Decimal;
}
