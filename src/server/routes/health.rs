//! Health check endpoint

use crate::server::routes::ApiResponse;
use crate::server::state::AppState;
use crate::storage::StorageHealthStatus;
use actix_web::{HttpResponse, Result as ActixResult, web};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::borrow::Cow;
use tracing::debug;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check));
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: Cow<'static, str>,
    pub timestamp: DateTime<Utc>,
    pub version: Cow<'static, str>,
    pub storage: StorageHealthStatus,
}

/// 200 when every storage backend answers, 503 otherwise
pub async fn health_check(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    debug!("Health check requested");

    let storage = state.pipeline.storage().health_check().await;
    let healthy = storage.overall;
    let health_status = HealthStatus {
        status: Cow::Borrowed(if healthy { "healthy" } else { "degraded" }),
        timestamp: Utc::now(),
        version: Cow::Borrowed(env!("CARGO_PKG_VERSION")),
        storage,
    };

    let mut response = if healthy {
        HttpResponse::Ok()
    } else {
        HttpResponse::ServiceUnavailable()
    };
    Ok(response.json(ApiResponse::success(health_status)))
}
