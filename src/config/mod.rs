//! Configuration management for the import service
//!
//! This module handles loading, validation, and management of all service configuration.

pub mod models;
pub mod validation;

pub use models::*;
pub use validation::Validate;

use crate::utils::error::{ImportError, Result};
use std::path::Path;
use tracing::{debug, info};

/// Main configuration struct for the import service
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,
}

impl Config {
    /// Load configuration from file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {:?}", path);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ImportError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml_str(&content)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let service: ServiceConfig = serde_yaml::from_str(content)
            .map_err(|e| ImportError::Config(format!("Failed to parse config: {}", e)))?;

        let config = Self { service };
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Load configuration from defaults plus environment variable overrides
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let service = ServiceConfig::from_env()?;
        let config = Self { service };

        config.validate()?;
        Ok(config)
    }

    /// Get server configuration
    pub fn server(&self) -> &ServerConfig {
        &self.service.server
    }

    /// Get storage configuration
    pub fn storage(&self) -> &StorageConfig {
        &self.service.storage
    }

    /// Get import pipeline settings
    pub fn import(&self) -> &ImportSettings {
        &self.service.import
    }

    /// Get logging configuration
    pub fn logging(&self) -> &LoggingConfig {
        &self.service.logging
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        debug!("Validating configuration");

        self.service
            .server
            .validate()
            .map_err(|e| ImportError::Config(format!("Server config error: {}", e)))?;

        self.service
            .storage
            .validate()
            .map_err(|e| ImportError::Config(format!("Storage config error: {}", e)))?;

        self.service
            .import
            .validate()
            .map_err(|e| ImportError::Config(format!("Import config error: {}", e)))?;

        self.service
            .logging
            .validate()
            .map_err(|e| ImportError::Config(format!("Logging config error: {}", e)))?;

        debug!("Configuration validation completed");
        Ok(())
    }

    /// Convert to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.service)
            .map_err(|e| ImportError::Config(format!("Failed to serialize config to YAML: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_config_from_file() {
        let config_content = r#"
server:
  host: "127.0.0.1"
  port: 9000

storage:
  database:
    url: "sqlite::memory:"
    enabled: true
  redis:
    url: "redis://localhost:6379"
    enabled: false

import:
  batch_size: 250
  max_attempts: 5

logging:
  level: "debug"
  json: true
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(config_content.as_bytes()).unwrap();

        let config = Config::from_file(temp_file.path()).await.unwrap();

        assert_eq!(config.server().host, "127.0.0.1");
        assert_eq!(config.server().port, 9000);
        assert_eq!(config.import().batch_size, 250);
        assert_eq!(config.import().max_attempts, 5);
        // Unspecified settings fall back to defaults
        assert_eq!(config.import().persist_step_percent, 5);
        assert!(config.logging().json);
        assert!(!config.storage().redis.enabled);
    }

    #[tokio::test]
    async fn test_config_from_missing_file() {
        let result = Config::from_file("/definitely/not/here.yaml").await;
        assert!(matches!(result, Err(ImportError::Config(_))));
    }

    #[test]
    fn test_invalid_import_settings_rejected() {
        let yaml = r#"
import:
  batch_size: 0
"#;
        let result = Config::from_yaml_str(yaml);
        assert!(matches!(result, Err(ImportError::Config(msg)) if msg.contains("batch_size")));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("batch_size"));
    }
}
