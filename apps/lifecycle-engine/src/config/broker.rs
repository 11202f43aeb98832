//! Broker connectivity, rate limiting and order-fill polling settings.

use serde::{Deserialize, Serialize};

/// Broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// REST base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer access token.
    #[serde(default)]
    pub access_token: String,
    /// Product code sent with every order.
    #[serde(default = "default_product")]
    pub product: String,
    /// Order validity.
    #[serde(default = "default_validity")]
    pub validity: String,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum gap between any two broker calls.
    #[serde(default = "default_min_call_gap_ms")]
    pub min_call_gap_ms: u64,
    /// Retry policy for rate-limited and transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Interval between order status polls.
    #[serde(default = "default_fill_poll_interval_ms")]
    pub fill_poll_interval_ms: u64,
    /// Status polls before an order is treated as timed out.
    #[serde(default = "default_max_fill_polls")]
    pub max_fill_polls: u32,
    /// Status checks after a failed cancel before assuming the order filled.
    #[serde(default = "default_cancel_verify_attempts")]
    pub cancel_verify_attempts: u32,
    /// Pause after cancel and between verification checks.
    #[serde(default = "default_cancel_settle_ms")]
    pub cancel_settle_ms: u64,
    /// In PAPER mode, report an empty position list instead of none so
    /// reconciliation runs against it.
    #[serde(default)]
    pub paper_reports_positions: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_token: String::new(),
            product: default_product(),
            validity: default_validity(),
            timeout_secs: default_timeout_secs(),
            min_call_gap_ms: default_min_call_gap_ms(),
            retry: RetryConfig::default(),
            fill_poll_interval_ms: default_fill_poll_interval_ms(),
            max_fill_polls: default_max_fill_polls(),
            cancel_verify_attempts: default_cancel_verify_attempts(),
            cancel_settle_ms: default_cancel_settle_ms(),
            paper_reports_positions: false,
        }
    }
}

/// Exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Growth factor per attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Jitter as a fraction of the base backoff.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.upstox.com".to_string()
}

fn default_product() -> String {
    "D".to_string()
}

fn default_validity() -> String {
    "DAY".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_min_call_gap_ms() -> u64 {
    1000
}

const fn default_fill_poll_interval_ms() -> u64 {
    500
}

const fn default_max_fill_polls() -> u32 {
    120
}

const fn default_cancel_verify_attempts() -> u32 {
    5
}

const fn default_cancel_settle_ms() -> u64 {
    1000
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_initial_backoff_ms() -> u64 {
    5000
}

const fn default_max_backoff_ms() -> u64 {
    60_000
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

const fn default_jitter_factor() -> f64 {
    0.2
}
