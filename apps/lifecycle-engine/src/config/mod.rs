//! Configuration module for the lifecycle engine.
//!
//! Loads YAML configuration with environment variable interpolation and
//! validates it before any controller is built.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lifecycle_engine::config::{Config, load_config};
//!
//! // Load from default path (config/lifecycle.yaml)
//! let config = load_config(None)?;
//!
//! // Load from custom path
//! let config = load_config(Some("custom/lifecycle.yaml"))?;
//!
//! println!("lot size: {}", config.engine.lot_size);
//! ```

mod broker;
mod engine;
mod feed;
mod observability;
mod persistence;
mod risk;
mod strategies;
mod timing;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use broker::{BrokerConfig, RetryConfig};
pub use engine::{EngineConfig, StrategyKind, TradingMode};
pub use feed::FeedConfig;
pub use observability::{LoggingConfig, ObservabilityConfig};
pub use persistence::PersistenceConfig;
pub use risk::RiskConfig;
pub use strategies::{BatmanConfig, CalendarConfig, DeltaRule, IronflyConfig};
pub use timing::TimingConfig;

/// Default configuration path.
pub const DEFAULT_CONFIG_PATH: &str = "config/lifecycle.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Engine-wide settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Portfolio risk limits.
    #[serde(default)]
    pub risk: RiskConfig,
    /// Time gates and holidays.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Calendar strategy parameters.
    #[serde(default)]
    pub calendar: CalendarConfig,
    /// Iron-fly strategy parameters.
    #[serde(default)]
    pub ironfly: IronflyConfig,
    /// Batman strategy parameters.
    #[serde(default)]
    pub batman: BatmanConfig,
    /// Broker connectivity.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Market feed source.
    #[serde(default)]
    pub feed: FeedConfig,
    /// State and journal storage.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

pub(crate) const fn default_true() -> bool {
    true
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or(DEFAULT_CONFIG_PATH);

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = if interpolated.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml_bw::from_str(&interpolated)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let var_name = cap.get(1).map_or("", |m| m.as_str());
        let default_value = cap.get(2).map(|m| m.as_str());
        match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        }
    })
    .into_owned()
}

/// Check a zero-padded 24-hour `HH:MM` string.
///
/// Gate comparisons are lexicographic, so anything else would compare wrongly.
pub fn is_valid_hhmm(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return false;
    }
    let digits = [bytes[0], bytes[1], bytes[3], bytes[4]];
    if !digits.iter().all(u8::is_ascii_digit) {
        return false;
    }
    let hours = (digits[0] - b'0') * 10 + (digits[1] - b'0');
    let minutes = (digits[2] - b'0') * 10 + (digits[3] - b'0');
    hours < 24 && minutes < 60
}

fn validate_delta_rule(name: &str, rule: &DeltaRule) -> Result<(), ConfigError> {
    if rule.trigger_low >= rule.trigger_high {
        return Err(ConfigError::ValidationError(format!(
            "{name}.trigger_low must be below {name}.trigger_high"
        )));
    }
    if (rule.target_rise - rule.target_fall).abs() < f64::EPSILON {
        return Err(ConfigError::ValidationError(format!(
            "{name}.target_rise must differ from {name}.target_fall"
        )));
    }
    for (field, value) in [
        ("trigger_high", rule.trigger_high),
        ("trigger_low", rule.trigger_low),
        ("target_fall", rule.target_fall),
        ("target_rise", rule.target_rise),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::ValidationError(format!(
                "{name}.{field} must be between 0.0 and 1.0"
            )));
        }
    }
    Ok(())
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.engine.lot_size == 0 {
        return Err(ConfigError::ValidationError(
            "engine.lot_size must be positive".to_string(),
        ));
    }

    if config.engine.active_strategies.is_empty() {
        return Err(ConfigError::ValidationError(
            "engine.active_strategies must name at least one strategy".to_string(),
        ));
    }

    if config.engine.adjust_interval_minutes == 0 {
        return Err(ConfigError::ValidationError(
            "engine.adjust_interval_minutes must be positive".to_string(),
        ));
    }

    let times = [
        ("engine.market_open", &config.engine.market_open),
        ("engine.market_close", &config.engine.market_close),
        ("timing.entry_time", &config.timing.entry_time),
        ("timing.early_rollover_time", &config.timing.early_rollover_time),
        ("timing.pre_expiry_exit_time", &config.timing.pre_expiry_exit_time),
        ("ironfly.entry_time", &config.ironfly.entry_time),
        ("ironfly.exit_time", &config.ironfly.exit_time),
        ("batman.entry_time", &config.batman.entry_time),
        ("batman.entry_cutoff", &config.batman.entry_cutoff),
        ("batman.exit_time", &config.batman.exit_time),
    ];
    for (field, value) in times {
        if !is_valid_hhmm(value) {
            return Err(ConfigError::ValidationError(format!(
                "{field} must be a zero-padded HH:MM time, got '{value}'"
            )));
        }
    }

    validate_delta_rule("calendar.weekly", &config.calendar.weekly)?;
    validate_delta_rule("calendar.monthly", &config.calendar.monthly)?;

    if config.ironfly.capital <= rust_decimal::Decimal::ZERO {
        return Err(ConfigError::ValidationError(
            "ironfly.capital must be positive".to_string(),
        ));
    }

    if config.batman.core_lots == 0 {
        return Err(ConfigError::ValidationError(
            "batman.core_lots must be positive".to_string(),
        ));
    }

    if config.risk.max_loss < rust_decimal::Decimal::ZERO {
        return Err(ConfigError::ValidationError(
            "risk.max_loss must not be negative (use 0 to disable)".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.engine.risk_free_rate) {
        return Err(ConfigError::ValidationError(
            "engine.risk_free_rate must be between 0.0 and 1.0".to_string(),
        ));
    }

    Ok(())
}
