//! In-memory trade journal for testing.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::application::ports::{JournalError, RecordOutcome, TradeJournal, TradeRecord};

/// In-memory implementation of `TradeJournal`.
#[derive(Debug, Default)]
pub struct InMemoryTradeJournal {
    records: RwLock<Vec<TradeRecord>>,
}

impl InMemoryTradeJournal {
    /// Create an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<TradeRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Tags of all records, oldest first.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.tag).collect()
    }
}

#[async_trait]
impl TradeJournal for InMemoryTradeJournal {
    async fn record(&self, record: TradeRecord, dedupe: bool) -> Result<RecordOutcome, JournalError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if dedupe && records.iter().any(|existing| existing.same_event(&record)) {
            return Ok(RecordOutcome::Duplicate);
        }
        records.push(record);
        Ok(RecordOutcome::Written)
    }

    async fn closed_pnl(&self) -> Decimal {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|r| r.pnl)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::leg::Side;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn record(hour: u32, tag: &str, pnl: Option<Decimal>) -> TradeRecord {
        TradeRecord {
            timestamp: NaiveDate::from_ymd_opt(2026, 3, 5)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            instrument_key: "NSE_FO|40123".to_string(),
            side: Side::Sell,
            quantity: 65,
            price: dec!(120),
            expiry: None,
            tag: tag.to_string(),
            pnl,
        }
    }

    #[tokio::test]
    async fn test_dedupe_same_day() {
        let journal = InMemoryTradeJournal::new();
        assert_eq!(journal.record(record(10, "SYNC_EXISTING", None), true).await.unwrap(), RecordOutcome::Written);
        assert_eq!(journal.record(record(14, "SYNC_EXISTING", None), true).await.unwrap(), RecordOutcome::Duplicate);
        assert_eq!(journal.record(record(14, "SYNC_EXISTING", None), false).await.unwrap(), RecordOutcome::Written);
        assert_eq!(journal.records().len(), 2);
    }

    #[tokio::test]
    async fn test_closed_pnl_sums_booked_rows() {
        let journal = InMemoryTradeJournal::new();
        journal.record(record(10, "ENTRY", None), false).await.unwrap();
        journal.record(record(11, "EXIT_TARGET", Some(dec!(1500))), false).await.unwrap();
        journal.record(record(12, "ADJ_WEEKLY_FALL", Some(dec!(-400))), false).await.unwrap();
        assert_eq!(journal.closed_pnl().await, dec!(1100));
    }
}
