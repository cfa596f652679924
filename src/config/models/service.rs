//! Top-level service configuration

use super::*;
use crate::utils::error::{ImportError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Import pipeline settings
    #[serde(default)]
    pub import: ImportSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Defaults overridden by `IMPORT_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(host) = env_value::<String>("IMPORT_SERVER_HOST")? {
            config.server.host = host;
        }
        if let Some(port) = env_value("IMPORT_SERVER_PORT")? {
            config.server.port = port;
        }
        if let Some(url) = env_value::<String>("IMPORT_DATABASE_URL")? {
            config.storage.database.url = url;
            config.storage.database.enabled = true;
        }
        if let Some(url) = env_value::<String>("IMPORT_REDIS_URL")? {
            config.storage.redis.url = url;
            config.storage.redis.enabled = true;
        }
        if let Some(batch_size) = env_value("IMPORT_BATCH_SIZE")? {
            config.import.batch_size = batch_size;
        }
        if let Some(max_attempts) = env_value("IMPORT_MAX_ATTEMPTS")? {
            config.import.max_attempts = max_attempts;
        }
        if let Some(timeout) = env_value("IMPORT_BATCH_TIMEOUT_SECS")? {
            config.import.batch_timeout_secs = timeout;
        }
        if let Some(concurrency) = env_value("IMPORT_WORKER_CONCURRENCY")? {
            config.import.worker_concurrency = concurrency;
        }
        if let Some(level) = env_value::<String>("IMPORT_LOG_LEVEL")? {
            config.logging.level = level;
        }
        if let Some(json) = env_value("IMPORT_LOG_JSON")? {
            config.logging.json = json;
        }

        Ok(config)
    }
}

fn env_value<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ImportError::Config(format!("Invalid value for {}: {}", name, raw))),
        Err(_) => Ok(None),
    }
}
