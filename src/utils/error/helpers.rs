//! Helper constructors and classification for ImportError

use super::types::ImportError;

/// Helper functions for creating specific errors
#[allow(dead_code)]
impl ImportError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache(message.into())
    }

    pub fn job_not_found<S: Into<String>>(job_id: S) -> Self {
        Self::JobNotFound(job_id.into())
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn invalid_batch_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidBatchConfig(message.into())
    }

    pub fn transaction<S: Into<String>>(message: S) -> Self {
        Self::Transaction(message.into())
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub fn mapping<S: Into<String>>(message: S) -> Self {
        Self::Mapping(message.into())
    }

    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

impl ImportError {
    /// Systemic failures that the work queue should retry
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(_)
            | Self::Cache(_)
            | Self::Transaction(_)
            | Self::Timeout(_)
            | Self::Io(_) => true,
            #[cfg(feature = "redis")]
            Self::Redis(_) => true,
            _ => false,
        }
    }

    /// Failures that make the whole unit of work meaningless; never retried
    pub fn is_job_level(&self) -> bool {
        matches!(self, Self::JobNotFound(_) | Self::InvalidBatchConfig(_))
    }

    /// Short machine-readable code used in HTTP responses and logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            #[cfg(feature = "redis")]
            Self::Redis(_) => "CACHE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Yaml(_) => "YAML_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Cache(_) => "CACHE_ERROR",
            Self::JobNotFound(_) => "JOB_NOT_FOUND",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::InvalidBatchConfig(_) => "INVALID_BATCH_CONFIG",
            Self::Transaction(_) => "TRANSACTION_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Mapping(_) => "MAPPING_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
