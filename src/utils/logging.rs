//! Tracing subscriber initialisation
//!
//! The service logs exclusively through `tracing`; this module installs the
//! subscriber once at process start.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Build the filter for the configured level, letting `RUST_LOG` override it
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the global tracing subscriber
///
/// Calling this more than once is harmless: later calls leave the first
/// subscriber in place.
pub fn init_logging(config: &LoggingConfig) {
    let filter = build_filter(config);

    let result = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(false)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
