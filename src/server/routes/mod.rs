//! HTTP route modules

pub mod health;
pub mod imports;

use crate::core::import::TenantContext;
use crate::utils::error::{ImportError, Result};
use actix_web::{HttpRequest, HttpResponse, error::InternalError, web};
use serde::Serialize;

/// Header carrying the caller's tenant
pub const TENANT_HEADER: &str = "X-Tenant-ID";

/// Largest accepted JSON body; submitted imports carry all their rows
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Standard API response structure
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data (if successful)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// JSON extractor settings: body size limit and enveloped parse errors
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(MAX_BODY_BYTES)
        .error_handler(|err, _req| {
            let message = err.to_string();
            InternalError::from_response(
                err,
                HttpResponse::BadRequest().json(ApiResponse::<()>::error(message)),
            )
            .into()
        })
}

/// Tenant scope of a request, from the `X-Tenant-ID` header
pub fn tenant_context(req: &HttpRequest) -> Result<TenantContext> {
    let tenant = req
        .headers()
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ImportError::bad_request(format!("Missing {} header", TENANT_HEADER)))?;
    Ok(TenantContext::new(tenant))
}
