//! Observability configuration for logging and metrics.

use serde::{Deserialize, Serialize};

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObservabilityConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Prometheus listen address (e.g. "0.0.0.0:9100"). Disabled when absent.
    #[serde(default)]
    pub metrics_listen: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for the daily rolling log file. Console only when absent.
    #[serde(default)]
    pub directory: Option<String>,
    /// File name prefix for the rolling log.
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            directory: None,
            file_prefix: default_file_prefix(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_file_prefix() -> String {
    "lifecycle.log".to_string()
}
