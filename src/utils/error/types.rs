//! Error types for the import pipeline

use thiserror::Error;

/// Result type alias for the import pipeline
pub type Result<T> = std::result::Result<T, ImportError>;

/// Main error type for the import pipeline
///
/// Row-level problems (bad values, failed validation) are never represented
/// here once they reach a batch boundary: the worker folds them into the
/// batch result. Values of this type that escape a worker are either
/// systemic (and retried) or job-level (and dropped).
#[derive(Error, Debug)]
pub enum ImportError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Redis errors
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shared cache errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// The import job does not exist (or belongs to another tenant)
    #[error("Import job not found: {0}")]
    JobNotFound(String),

    /// Generic not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected job state transition
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Batch boundaries could not be computed for the job
    #[error("Invalid batch configuration: {0}")]
    InvalidBatchConfig(String),

    /// Batch-scope commit failures
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Field mapping errors
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Bad request errors
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}
