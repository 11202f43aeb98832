//! Per-cycle market snapshot handed to every strategy controller.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::chain::{ExpiryChain, GreeksQuote, OptionChainEntry};
use super::position_row::BrokerPositionRow;

/// Chains bucketed by expiry role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainSet {
    /// Nearest tradable weekly expiry.
    pub current_weekly: Option<ExpiryChain>,
    /// The weekly after that.
    pub next_weekly: Option<ExpiryChain>,
    /// Monitored monthly expiry.
    pub monthly: Option<ExpiryChain>,
}

impl ChainSet {
    /// Iterate the populated buckets, nearest first.
    pub fn iter(&self) -> impl Iterator<Item = &ExpiryChain> {
        [&self.current_weekly, &self.next_weekly, &self.monthly]
            .into_iter()
            .flatten()
    }

    /// Look up an instrument in any bucket.
    #[must_use]
    pub fn find_key(&self, instrument_key: &str) -> Option<&OptionChainEntry> {
        self.iter().find_map(|chain| chain.find_key(instrument_key))
    }

    /// Chain for a specific expiry date.
    #[must_use]
    pub fn for_expiry(&self, expiry: NaiveDate) -> Option<&ExpiryChain> {
        self.iter().find(|chain| chain.expiry == expiry)
    }
}

/// Broker position list, or an explicit signal that it could not be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BrokerSnapshot {
    /// Positions could not be fetched; reconciliation must be skipped.
    Unavailable,
    /// Positions fetched (possibly empty).
    Available(Vec<BrokerPositionRow>),
}

impl BrokerSnapshot {
    /// Rows, if available.
    #[must_use]
    pub fn rows(&self) -> Option<&[BrokerPositionRow]> {
        match self {
            Self::Unavailable => None,
            Self::Available(rows) => Some(rows),
        }
    }
}

/// Gating flags computed once per tick by the runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketFlags {
    /// A fresh structure may be opened.
    pub can_enter_new_cycle: bool,
    /// First tick of an adjustment candle.
    pub can_adjust: bool,
    /// Today is the monthly expiry (last listed expiry of its month).
    pub is_expiry_today: bool,
    /// Tomorrow's session is the monitored monthly expiry.
    pub is_day_before_monthly_expiry: bool,
    /// Today's expiry was skipped when bucketing chains.
    pub expiry_skipped: bool,
}

/// Everything a controller sees for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    /// Exchange-local wall clock.
    pub now: NaiveDateTime,
    /// Underlying spot.
    pub spot: Decimal,
    /// Spot at the previous tick, if any.
    pub previous_spot: Option<Decimal>,
    /// Bucketed chains.
    pub chains: ChainSet,
    /// Last price by instrument key.
    pub quotes: HashMap<String, Decimal>,
    /// Greeks by instrument key.
    pub greeks: HashMap<String, GreeksQuote>,
    /// Broker positions.
    pub broker: BrokerSnapshot,
    /// Precomputed gating flags.
    pub flags: MarketFlags,
}

impl MarketSnapshot {
    /// Trading date of this snapshot.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.now.date()
    }

    /// Last price for an instrument, from quotes then chains.
    #[must_use]
    pub fn last_price(&self, instrument_key: &str) -> Option<Decimal> {
        self.quotes.get(instrument_key).copied().or_else(|| {
            self.chains
                .find_key(instrument_key)
                .map(|entry| entry.last_price)
                .filter(|price| *price > Decimal::ZERO)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::leg::OptionType;
    use rust_decimal_macros::dec;

    fn entry(key: &str, expiry: NaiveDate, ltp: Decimal) -> OptionChainEntry {
        OptionChainEntry {
            instrument_key: key.to_string(),
            strike: dec!(24000),
            option_type: OptionType::Put,
            delta: Some(-0.5),
            iv: 0.12,
            time_to_expiry: None,
            last_price: ltp,
            expiry_date: expiry,
        }
    }

    #[test]
    fn test_last_price_prefers_quotes() {
        let expiry = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        let snapshot = MarketSnapshot {
            now: expiry.and_hms_opt(10, 0, 0).unwrap(),
            spot: dec!(24000),
            previous_spot: None,
            chains: ChainSet {
                current_weekly: Some(ExpiryChain::new(
                    expiry,
                    vec![entry("A", expiry, dec!(90)), entry("B", expiry, dec!(0))],
                )),
                ..ChainSet::default()
            },
            quotes: HashMap::from([("A".to_string(), dec!(95))]),
            greeks: HashMap::new(),
            broker: BrokerSnapshot::Unavailable,
            flags: MarketFlags::default(),
        };
        assert_eq!(snapshot.last_price("A"), Some(dec!(95)));
        assert_eq!(snapshot.last_price("B"), None);
        assert_eq!(snapshot.chains.for_expiry(expiry).map(|c| c.entries.len()), Some(2));
        assert!(snapshot.broker.rows().is_none());
    }
}
