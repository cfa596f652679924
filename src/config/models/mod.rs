//! Configuration data models
//!
//! This module defines all configuration structures used throughout the service.

#![allow(missing_docs)]

pub mod import;
pub mod logging;
pub mod server;
pub mod service;
pub mod storage;

// Re-export all configuration types
pub use import::*;
pub use logging::*;
pub use server::*;
pub use service::*;
pub use storage::*;

/// Default values for configuration
pub fn default_host() -> String {
    "0.0.0.0".to_string()
}

/// Default server port
pub fn default_port() -> u16 {
    8000
}

/// Default maximum database connections
pub fn default_max_connections() -> u32 {
    10
}

/// Default connection timeout in seconds
pub fn default_connection_timeout() -> u64 {
    5
}

pub fn default_batch_size() -> usize {
    100
}

pub fn default_max_attempts() -> u32 {
    3
}

pub fn default_batch_timeout_secs() -> u64 {
    300 // 5 minutes
}

pub fn default_retry_backoff_ms() -> u64 {
    500
}

pub fn default_result_ttl_secs() -> u64 {
    7200 // 2 hours
}

pub fn default_cancellation_ttl_secs() -> u64 {
    86_400 // 24 hours
}

pub fn default_persist_step_percent() -> u8 {
    5
}

pub fn default_worker_concurrency() -> usize {
    4
}

pub fn default_preview_length() -> usize {
    100
}

pub fn default_max_error_samples() -> usize {
    50
}

pub fn default_log_level() -> String {
    "info".to_string()
}
