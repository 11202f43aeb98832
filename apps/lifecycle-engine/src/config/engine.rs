//! Engine-wide settings: trading mode, underlying, lot size and polling cadence.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trading mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradingMode {
    /// Simulated fills against the last quoted price.
    #[default]
    Paper,
    /// Real orders routed to the broker.
    Live,
}

impl TradingMode {
    /// Check if this is live trading.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Lowercase name used in state file names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Live => "live",
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paper => write!(f, "PAPER"),
            Self::Live => write!(f, "LIVE"),
        }
    }
}

/// Strategy variants that can be activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Weekly short put hedged by a monthly long put.
    Calendar,
    /// Three-strike put butterfly with a one-shot call-calendar repair.
    Ironfly,
    /// Six-leg double ratio structure.
    Batman,
}

impl StrategyKind {
    /// Stable name used for state files, journals and logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Ironfly => "ironfly",
            Self::Batman => "batman",
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Trading mode.
    #[serde(default)]
    pub mode: TradingMode,
    /// Underlying name used to filter broker rows (e.g. "NIFTY").
    #[serde(default = "default_underlying")]
    pub underlying: String,
    /// Instrument key of the spot index.
    #[serde(default = "default_spot_instrument_key")]
    pub spot_instrument_key: String,
    /// Exchange lot size; every leg quantity is a multiple of it.
    #[serde(default = "default_lot_size")]
    pub lot_size: u32,
    /// Seconds between poll cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Strategies run each cycle, in order.
    #[serde(default = "default_active_strategies")]
    pub active_strategies: Vec<StrategyKind>,
    /// Prefix for broker order tags.
    #[serde(default = "default_order_tag_prefix")]
    pub order_tag_prefix: String,
    /// Market open (HH:MM).
    #[serde(default = "default_market_open")]
    pub market_open: String,
    /// Market close (HH:MM), after which LIVE mode idles.
    #[serde(default = "default_market_close")]
    pub market_close: String,
    /// Candle length in minutes; adjustments are evaluated on candle marks.
    #[serde(default = "default_adjust_interval_minutes")]
    pub adjust_interval_minutes: u32,
    /// Offset added to the P&L summary to align with broker history.
    #[serde(default)]
    pub manual_pnl_offset: Decimal,
    /// Annual risk-free rate for the Black-Scholes delta fallback.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: TradingMode::default(),
            underlying: default_underlying(),
            spot_instrument_key: default_spot_instrument_key(),
            lot_size: default_lot_size(),
            poll_interval_secs: default_poll_interval_secs(),
            active_strategies: default_active_strategies(),
            order_tag_prefix: default_order_tag_prefix(),
            market_open: default_market_open(),
            market_close: default_market_close(),
            adjust_interval_minutes: default_adjust_interval_minutes(),
            manual_pnl_offset: Decimal::ZERO,
            risk_free_rate: default_risk_free_rate(),
        }
    }
}

fn default_underlying() -> String {
    "NIFTY".to_string()
}

fn default_spot_instrument_key() -> String {
    "NSE_INDEX|Nifty 50".to_string()
}

const fn default_lot_size() -> u32 {
    65
}

const fn default_poll_interval_secs() -> u64 {
    30
}

fn default_active_strategies() -> Vec<StrategyKind> {
    vec![StrategyKind::Calendar]
}

fn default_order_tag_prefix() -> String {
    "algo".to_string()
}

fn default_market_open() -> String {
    "09:15".to_string()
}

fn default_market_close() -> String {
    "15:35".to_string()
}

const fn default_adjust_interval_minutes() -> u32 {
    5
}

const fn default_risk_free_rate() -> f64 {
    0.07
}
