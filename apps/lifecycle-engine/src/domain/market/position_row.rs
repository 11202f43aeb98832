//! Broker Position Rows
//!
//! Brokers report positions under drifting field names. [`RawPositionRow`]
//! accepts the known aliases and [`normalize_row`] turns it into the one
//! canonical [`BrokerPositionRow`] the reconciliation engine consumes.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::leg::{OptionType, Side};

/// Position row as delivered by a broker API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPositionRow {
    /// Instrument token / key.
    #[serde(default, alias = "instrument_token", alias = "token")]
    pub instrument_key: Option<String>,
    /// Trading symbol.
    #[serde(default, alias = "tradingsymbol", alias = "symbol")]
    pub trading_symbol: Option<String>,
    /// Signed net quantity.
    #[serde(default, alias = "quantity")]
    pub net_quantity: i64,
    /// Holding average price.
    #[serde(default)]
    pub average_price: Option<Decimal>,
    /// Total bought value.
    #[serde(default)]
    pub buy_value: Option<Decimal>,
    /// Total sold value.
    #[serde(default)]
    pub sell_value: Option<Decimal>,
    /// Intraday buy price.
    #[serde(default)]
    pub day_buy_price: Option<Decimal>,
    /// Intraday sell price.
    #[serde(default)]
    pub day_sell_price: Option<Decimal>,
    /// Buy price.
    #[serde(default)]
    pub buy_price: Option<Decimal>,
    /// Sell price.
    #[serde(default)]
    pub sell_price: Option<Decimal>,
    /// Last traded price.
    #[serde(default, alias = "ltp")]
    pub last_price: Option<Decimal>,
    /// Strike, when the broker sends it.
    #[serde(default, alias = "strike")]
    pub strike_price: Option<Decimal>,
    /// Expiry as text.
    #[serde(default, alias = "expiry_date")]
    pub expiry: Option<String>,
}

/// Canonical broker position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPositionRow {
    /// Uppercased instrument key.
    pub instrument_key: String,
    /// Uppercased trading symbol.
    pub symbol: String,
    /// Signed net quantity.
    pub quantity: i64,
    /// Cost basis per unit.
    pub price: Decimal,
    /// Total bought value.
    pub buy_value: Decimal,
    /// Total sold value.
    pub sell_value: Decimal,
    /// Last traded price.
    pub last_price: Decimal,
    /// Strike (0 when unknown).
    pub strike: Decimal,
    /// Option type, if the symbol tells.
    pub option_type: Option<OptionType>,
    /// Expiry, if known.
    pub expiry: Option<NaiveDate>,
}

impl BrokerPositionRow {
    /// Side implied by the signed quantity.
    #[must_use]
    pub const fn side(&self) -> Option<Side> {
        Side::from_signed(self.quantity)
    }

    /// Absolute quantity.
    #[must_use]
    pub fn abs_quantity(&self) -> u32 {
        u32::try_from(self.quantity.unsigned_abs()).unwrap_or(u32::MAX)
    }

    /// Whether the row belongs to `underlying`.
    #[must_use]
    pub fn matches_underlying(&self, underlying: &str) -> bool {
        let needle = underlying.to_uppercase();
        self.instrument_key.contains(&needle) || self.symbol.contains(&needle)
    }

    /// Broker-side P&L: `sell_value - buy_value + qty * ltp`.
    #[must_use]
    pub fn broker_pnl(&self) -> Decimal {
        self.sell_value - self.buy_value + Decimal::from(self.quantity) * self.last_price
    }
}

#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn strike_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d{5})(?:PE|CE)").expect("strike regex is valid"))
}

fn parse_expiry(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    ["%Y-%m-%d", "%d-%b-%Y", "%d-%m-%Y", "%Y%m%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn positive(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|v| *v > Decimal::ZERO)
}

/// Normalise a raw broker row. Returns `None` for rows without an
/// instrument key.
#[must_use]
pub fn normalize_row(raw: &RawPositionRow) -> Option<BrokerPositionRow> {
    let instrument_key = raw
        .instrument_key
        .as_deref()
        .map(|k| k.trim().to_uppercase())
        .filter(|k| !k.is_empty())?;
    let symbol = raw
        .trading_symbol
        .as_deref()
        .map(|s| s.trim().to_uppercase())
        .unwrap_or_default();
    let quantity = raw.net_quantity;
    let buy_value = raw.buy_value.unwrap_or_default();
    let sell_value = raw.sell_value.unwrap_or_default();

    let from_values = if quantity == 0 {
        None
    } else {
        positive(Some((buy_value - sell_value).abs() / Decimal::from(quantity.unsigned_abs())))
    };
    let fallback = if quantity > 0 {
        positive(raw.day_buy_price).or(positive(raw.buy_price))
    } else {
        positive(raw.day_sell_price).or(positive(raw.sell_price))
    };
    let price = positive(raw.average_price)
        .or(from_values)
        .or(fallback)
        .unwrap_or_default();

    let strike = positive(raw.strike_price)
        .or_else(|| {
            strike_pattern()
                .captures(&symbol)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<Decimal>().ok())
        })
        .unwrap_or_default();

    let compact = symbol.replace(' ', "");
    let option_type = if compact.ends_with("PE") {
        Some(OptionType::Put)
    } else if compact.ends_with("CE") {
        Some(OptionType::Call)
    } else {
        None
    };

    Some(BrokerPositionRow {
        instrument_key,
        symbol,
        quantity,
        price,
        buy_value,
        sell_value,
        last_price: raw.last_price.unwrap_or_default(),
        strike,
        option_type,
        expiry: raw.expiry.as_deref().and_then(parse_expiry),
    })
}
