//! CSV trade journal.
//!
//! One append-only file per strategy, `trade_log_{strategy}.csv`, with the
//! columns `timestamp,instrument_key,side,qty,price,expiry,tag,pnl`. The
//! running closed P&L and the same-day dedupe keys are seeded from the rows
//! already on disk, so a restart picks up where the last run stopped.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::ports::{JournalError, RecordOutcome, TradeJournal, TradeRecord};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const NO_EXPIRY: &str = "N/A";

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    timestamp: String,
    instrument_key: &'a str,
    side: &'a str,
    qty: u32,
    price: Decimal,
    expiry: String,
    tag: &'a str,
    pnl: Option<Decimal>,
}

/// Rows are read back leniently: older files may hold `None` or blanks.
#[derive(Debug, Deserialize)]
struct StoredRow {
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    instrument_key: String,
    #[serde(default)]
    tag: String,
    #[serde(default)]
    pnl: String,
}

type EventKey = (String, String, NaiveDate);

#[derive(Debug, Default)]
struct Ledger {
    closed_pnl: Decimal,
    events: HashSet<EventKey>,
}

fn event_key(instrument_key: &str, tag: &str, date: NaiveDate) -> EventKey {
    (instrument_key.to_uppercase(), tag.to_string(), date)
}

/// File-backed implementation of `TradeJournal`.
#[derive(Debug)]
pub struct CsvTradeJournal {
    path: PathBuf,
    ledger: Mutex<Ledger>,
}

impl CsvTradeJournal {
    /// Open (or create) the journal for `strategy` under `dir`.
    pub fn open(dir: impl AsRef<Path>, strategy: &str) -> Result<Self, JournalError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("trade_log_{strategy}.csv"));

        let ledger = if path.exists() {
            load_ledger(&path)?
        } else {
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(["timestamp", "instrument_key", "side", "qty", "price", "expiry", "tag", "pnl"])?;
            writer.flush()?;
            Ledger::default()
        };

        tracing::debug!(
            path = %path.display(),
            closed_pnl = %ledger.closed_pnl,
            "Trade journal opened"
        );
        Ok(Self {
            path,
            ledger: Mutex::new(ledger),
        })
    }

    /// Journal file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &TradeRecord) -> Result<(), JournalError> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.serialize(CsvRow {
            timestamp: record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            instrument_key: &record.instrument_key,
            side: record.side.as_str(),
            qty: record.quantity,
            price: record.price,
            expiry: record
                .expiry
                .map_or_else(|| NO_EXPIRY.to_string(), |d| d.to_string()),
            tag: &record.tag,
            pnl: record.pnl,
        })?;
        writer.flush()?;
        Ok(())
    }
}

fn load_ledger(path: &Path) -> Result<Ledger, JournalError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut ledger = Ledger::default();
    for row in reader.deserialize::<StoredRow>() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable journal row");
                continue;
            }
        };
        if let Ok(pnl) = row.pnl.trim().parse::<Decimal>() {
            ledger.closed_pnl += pnl;
        }
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(row.timestamp.trim(), TIMESTAMP_FORMAT) {
            ledger
                .events
                .insert(event_key(&row.instrument_key, &row.tag, timestamp.date()));
        }
    }
    Ok(ledger)
}

#[async_trait]
impl TradeJournal for CsvTradeJournal {
    async fn record(&self, record: TradeRecord, dedupe: bool) -> Result<RecordOutcome, JournalError> {
        let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        let key = event_key(&record.instrument_key, &record.tag, record.timestamp.date());
        if dedupe && ledger.events.contains(&key) {
            return Ok(RecordOutcome::Duplicate);
        }

        self.append(&record)?;
        ledger.events.insert(key);
        if let Some(pnl) = record.pnl {
            ledger.closed_pnl += pnl;
        }
        Ok(RecordOutcome::Written)
    }

    async fn closed_pnl(&self) -> Decimal {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed_pnl
    }
}
