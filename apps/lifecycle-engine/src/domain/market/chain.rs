//! Option Chain Types

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::leg::OptionType;

/// One contract row of an option chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChainEntry {
    /// Broker instrument identifier.
    pub instrument_key: String,
    /// Strike price.
    pub strike: Decimal,
    /// Call or put.
    pub option_type: OptionType,
    /// Broker-reported delta, if any.
    #[serde(default)]
    pub delta: Option<f64>,
    /// Implied volatility (0 when unknown).
    #[serde(default)]
    pub iv: f64,
    /// Time to expiry in years.
    #[serde(default)]
    pub time_to_expiry: Option<f64>,
    /// Last traded price.
    #[serde(default)]
    pub last_price: Decimal,
    /// Contract expiry.
    pub expiry_date: NaiveDate,
}

impl OptionChainEntry {
    /// Absolute delta, if reported.
    #[must_use]
    pub fn abs_delta(&self) -> Option<f64> {
        self.delta.filter(|d| d.is_finite()).map(f64::abs)
    }
}

/// Greeks reading for one instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GreeksQuote {
    /// Delta, if reported.
    #[serde(default)]
    pub delta: Option<f64>,
    /// Implied volatility, if reported.
    #[serde(default)]
    pub iv: Option<f64>,
}

/// All contracts of one expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiryChain {
    /// Expiry date of every entry.
    pub expiry: NaiveDate,
    /// Contracts.
    pub entries: Vec<OptionChainEntry>,
}

impl ExpiryChain {
    /// Create a chain for an expiry.
    #[must_use]
    pub const fn new(expiry: NaiveDate, entries: Vec<OptionChainEntry>) -> Self {
        Self { expiry, entries }
    }

    /// Entries of one option type.
    #[must_use]
    pub fn of_type(&self, option_type: OptionType) -> Vec<&OptionChainEntry> {
        self.entries
            .iter()
            .filter(|e| e.option_type == option_type)
            .collect()
    }

    /// Entry by instrument key.
    #[must_use]
    pub fn find_key(&self, instrument_key: &str) -> Option<&OptionChainEntry> {
        self.entries
            .iter()
            .find(|e| e.instrument_key == instrument_key)
    }

    /// Entry by exact strike and type.
    #[must_use]
    pub fn find_strike(&self, strike: Decimal, option_type: OptionType) -> Option<&OptionChainEntry> {
        self.entries
            .iter()
            .find(|e| e.strike == strike && e.option_type == option_type)
    }
}
