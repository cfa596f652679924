//! HTTP response conversion for ImportError

use super::types::ImportError;
use actix_web::{HttpResponse, ResponseError, http::StatusCode};

impl ResponseError for ImportError {
    fn status_code(&self) -> StatusCode {
        match self {
            ImportError::JobNotFound(_) | ImportError::NotFound(_) => StatusCode::NOT_FOUND,
            ImportError::InvalidState(_) => StatusCode::CONFLICT,
            ImportError::BadRequest(_)
            | ImportError::Validation(_)
            | ImportError::Mapping(_)
            | ImportError::InvalidBatchConfig(_)
            | ImportError::Serialization(_) => StatusCode::BAD_REQUEST,
            ImportError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ImportError::Database(_) => "Database operation failed".to_string(),
            ImportError::Cache(_) => "Cache operation failed".to_string(),
            #[cfg(feature = "redis")]
            ImportError::Redis(_) => "Cache operation failed".to_string(),
            ImportError::Io(_) | ImportError::Internal(_) | ImportError::Transaction(_) => {
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                timestamp: chrono::Utc::now().timestamp(),
            },
        };

        HttpResponse::build(self.status_code()).json(error_response)
    }
}

/// Standard error response format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail structure
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub timestamp: i64,
}
