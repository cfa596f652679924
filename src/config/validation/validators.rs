//! Validators for each configuration section

use super::trait_def::Validate;
use crate::config::models::*;
use tracing::debug;

impl Validate for ServerConfig {
    fn validate(&self) -> Result<(), String> {
        debug!("Validating server configuration");

        if self.host.is_empty() {
            return Err("Server host cannot be empty".to_string());
        }
        if self.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }
        if let Some(0) = self.workers {
            return Err("Worker count must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Validate for StorageConfig {
    fn validate(&self) -> Result<(), String> {
        if self.database.enabled {
            if self.database.url.is_empty() {
                return Err("Database URL is required when the database is enabled".to_string());
            }
            if self.database.max_connections == 0 {
                return Err("Database max_connections must be greater than 0".to_string());
            }
        }
        if self.redis.enabled && url::Url::parse(&self.redis.url).is_err() {
            return Err(format!("Invalid Redis URL: {}", self.redis.url));
        }
        Ok(())
    }
}

impl Validate for ImportSettings {
    fn validate(&self) -> Result<(), String> {
        debug!("Validating import settings");

        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.batch_timeout_secs == 0 {
            return Err("batch_timeout_secs must be greater than 0".to_string());
        }
        if self.result_ttl_secs == 0 || self.cancellation_ttl_secs == 0 {
            return Err("Cache TTLs must be greater than 0".to_string());
        }
        if !(1..=100).contains(&self.persist_step_percent) {
            return Err("persist_step_percent must be between 1 and 100".to_string());
        }
        if self.worker_concurrency == 0 {
            return Err("worker_concurrency must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        if self.level.trim().is_empty() {
            return Err("Log level cannot be empty".to_string());
        }
        Ok(())
    }
}
