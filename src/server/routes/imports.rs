//! Import job endpoints

use crate::core::import::{
    FieldMapping, ImportType, JobStatusView, ParseOptions, PreparsedRows, RawRow,
};
use crate::server::routes::{ApiResponse, tenant_context};
use crate::server::state::AppState;
use crate::utils::error::{ImportError, Result};
use actix_web::{HttpRequest, HttpResponse, web};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/imports")
            .route("", web::post().to(submit_import))
            .route("", web::get().to(list_imports))
            .route("/{job_id}", web::get().to(import_status))
            .route(
                "/{job_id}/batches/{batch_number}",
                web::get().to(batch_result),
            )
            .route("/{job_id}/cancel", web::post().to(cancel_import))
            .route("/{job_id}/rollback", web::post().to(rollback_import)),
    );
}

/// Body of `POST /api/v1/imports`
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitImportRequest {
    pub import_type: ImportType,
    /// Detected from the rows when omitted
    #[serde(default)]
    pub field_mapping: Option<FieldMapping>,
    pub rows: Vec<RawRow>,
    #[serde(default)]
    pub options: ParseOptions,
}

/// Create and schedule a job; answers before the batches run
async fn submit_import(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<SubmitImportRequest>,
) -> Result<HttpResponse> {
    let ctx = tenant_context(&req)?;
    let SubmitImportRequest {
        import_type,
        field_mapping,
        rows,
        options,
    } = body.into_inner();

    info!(
        tenant = %ctx.tenant_id,
        import_type = %import_type,
        rows = rows.len(),
        "Import submitted"
    );

    let parser = PreparsedRows::new(rows);
    let job = state
        .pipeline
        .import_file(&ctx, import_type, &parser, field_mapping, &options)
        .await?;

    Ok(HttpResponse::Accepted().json(ApiResponse::success(JobStatusView::from_job(&job))))
}

async fn list_imports(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let ctx = tenant_context(&req)?;
    let jobs = state.pipeline.list(&ctx).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(jobs)))
}

async fn import_status(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let ctx = tenant_context(&req)?;
    let view = state.pipeline.status(&ctx, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(view)))
}

async fn batch_result(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<(Uuid, usize)>,
) -> Result<HttpResponse> {
    let ctx = tenant_context(&req)?;
    let (job_id, batch_number) = path.into_inner();
    let result = state
        .pipeline
        .batch_result(&ctx, job_id, batch_number)
        .await?
        .ok_or_else(|| {
            ImportError::not_found(format!(
                "No result for batch {} of import job {}",
                batch_number, job_id
            ))
        })?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(result)))
}

async fn cancel_import(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let ctx = tenant_context(&req)?;
    let view = state.pipeline.cancel(&ctx, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(view)))
}

async fn rollback_import(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let ctx = tenant_context(&req)?;
    let report = state.pipeline.rollback(&ctx, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(report)))
}
