//! Tracing subscriber setup.
//!
//! Installs an `EnvFilter` (config level, `RUST_LOG` overrides), a console
//! layer and, when a directory is configured, a daily rolling file layer
//! written through a non-blocking appender.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Error type for tracing operations.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    /// The filter directive could not be parsed.
    #[error("invalid log filter '{directive}': {message}")]
    InvalidFilter {
        /// Directive that failed.
        directive: String,
        /// Parser message.
        message: String,
    },
    /// A global subscriber was already installed.
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberError(String),
}

/// Keeps the file appender flushing until dropped.
#[must_use = "dropping the guard stops the file writer"]
pub struct TracingGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize the global tracing subscriber.
pub fn init_tracing(config: &LoggingConfig) -> Result<TracingGuard, TracingError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| TracingError::InvalidFilter {
            directive: config.level.clone(),
            message: e.to_string(),
        })?,
    };

    let json = config.format.eq_ignore_ascii_case("json");

    let (file_layer, file_guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);
    let result = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    result.map_err(|e| TracingError::SubscriberError(e.to_string()))?;

    tracing::info!(
        level = %config.level,
        format = %config.format,
        directory = config.directory.as_deref().unwrap_or("-"),
        "Tracing initialized"
    );

    Ok(TracingGuard { _file: file_guard })
}
