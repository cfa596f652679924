use crate::core::import::job::{ImportJob, ImportStatus, JobFinalization, JobProgress};
use crate::core::import::types::{DeltaAction, RollbackDelta};
use crate::storage::jobs::JobStore;
use crate::utils::error::{ImportError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::*;
use tracing::debug;
use uuid::Uuid;

use super::super::entities::{self, import_job, import_rollback_delta};
use super::SeaOrmDatabase;

const ACTIVE_STATUSES: [&str; 2] = ["pending", "processing"];

fn job_from_model(model: import_job::Model) -> Result<ImportJob> {
    Ok(ImportJob {
        id: Uuid::parse_str(&model.id)
            .map_err(|e| ImportError::internal(format!("Corrupt import job id: {}", e)))?,
        tenant_id: model.tenant_id,
        import_type: model.import_type.parse()?,
        status: model.status.parse()?,
        total_records: model.total_records.max(0) as u64,
        processed_records: model.processed_records.max(0) as u64,
        successful_imports: model.successful_imports.max(0) as u64,
        failed_imports: model.failed_imports.max(0) as u64,
        progress_percentage: model.progress_percentage.clamp(0, 100) as u8,
        field_mapping: serde_json::from_str(&model.field_mapping)?,
        errors: serde_json::from_str(&model.errors)?,
        created_at: model.created_at.with_timezone(&Utc),
        started_at: model.started_at.map(|at| at.with_timezone(&Utc)),
        completed_at: model.completed_at.map(|at| at.with_timezone(&Utc)),
        processing_time_seconds: model.processing_time_seconds,
    })
}

fn delta_from_model(model: import_rollback_delta::Model) -> Result<RollbackDelta> {
    Ok(RollbackDelta {
        action: model.action.parse::<DeltaAction>()?,
        entity_type: model.entity_type,
        entity_id: model.entity_id,
        prior_state: model
            .prior_state
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        batch_number: model.batch_number.max(0) as usize,
    })
}

impl SeaOrmDatabase {
    fn job_filter(tenant: &str, id: Uuid) -> Condition {
        Condition::all()
            .add(import_job::Column::Id.eq(id.to_string()))
            .add(import_job::Column::TenantId.eq(tenant))
    }

    async fn require_job(&self, tenant: &str, id: Uuid) -> Result<ImportJob> {
        JobStore::get(self, tenant, id)
            .await?
            .ok_or_else(|| ImportError::job_not_found(id.to_string()))
    }
}

#[async_trait]
impl JobStore for SeaOrmDatabase {
    async fn create(&self, job: &ImportJob) -> Result<()> {
        debug!("Creating import job: {}", job.id);

        let active_model = import_job::ActiveModel {
            id: Set(job.id.to_string()),
            tenant_id: Set(job.tenant_id.clone()),
            import_type: Set(job.import_type.as_str().to_string()),
            status: Set(job.status.as_str().to_string()),
            total_records: Set(job.total_records as i64),
            processed_records: Set(job.processed_records as i64),
            successful_imports: Set(job.successful_imports as i64),
            failed_imports: Set(job.failed_imports as i64),
            progress_percentage: Set(job.progress_percentage as i32),
            field_mapping: Set(serde_json::to_string(&job.field_mapping)?),
            errors: Set(serde_json::to_string(&job.errors)?),
            created_at: Set(job.created_at.into()),
            started_at: Set(job.started_at.map(Into::into)),
            completed_at: Set(job.completed_at.map(Into::into)),
            processing_time_seconds: Set(job.processing_time_seconds),
        };

        entities::ImportJob::insert(active_model)
            .exec(&self.db)
            .await
            .map_err(ImportError::Database)?;

        Ok(())
    }

    async fn get(&self, tenant: &str, id: Uuid) -> Result<Option<ImportJob>> {
        entities::ImportJob::find()
            .filter(Self::job_filter(tenant, id))
            .one(&self.db)
            .await
            .map_err(ImportError::Database)?
            .map(job_from_model)
            .transpose()
    }

    async fn set_total_records(&self, tenant: &str, id: Uuid, total: u64) -> Result<()> {
        let result = entities::ImportJob::update_many()
            .col_expr(import_job::Column::TotalRecords, Expr::value(total as i64))
            .filter(Self::job_filter(tenant, id))
            .exec(&self.db)
            .await
            .map_err(ImportError::Database)?;

        if result.rows_affected == 0 {
            return Err(ImportError::job_not_found(id.to_string()));
        }
        Ok(())
    }

    async fn mark_processing(&self, tenant: &str, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let started_at: DateTimeWithTimeZone = at.into();
        let result = entities::ImportJob::update_many()
            .col_expr(
                import_job::Column::Status,
                Expr::value(ImportStatus::Processing.as_str()),
            )
            .col_expr(import_job::Column::StartedAt, Expr::value(Some(started_at)))
            .filter(Self::job_filter(tenant, id))
            .filter(import_job::Column::Status.eq(ImportStatus::Pending.as_str()))
            .exec(&self.db)
            .await
            .map_err(ImportError::Database)?;

        Ok(result.rows_affected == 1)
    }

    async fn update_progress(
        &self,
        tenant: &str,
        id: Uuid,
        progress: &JobProgress,
    ) -> Result<bool> {
        let result = entities::ImportJob::update_many()
            .col_expr(
                import_job::Column::ProcessedRecords,
                Expr::value(progress.processed as i64),
            )
            .col_expr(
                import_job::Column::SuccessfulImports,
                Expr::value(progress.successful as i64),
            )
            .col_expr(
                import_job::Column::FailedImports,
                Expr::value(progress.failed as i64),
            )
            .col_expr(
                import_job::Column::ProgressPercentage,
                Expr::value(progress.percentage as i32),
            )
            .filter(Self::job_filter(tenant, id))
            .filter(import_job::Column::ProcessedRecords.lt(progress.processed as i64))
            .filter(import_job::Column::ProgressPercentage.lte(progress.percentage as i32))
            .filter(import_job::Column::Status.is_in(ACTIVE_STATUSES))
            .exec(&self.db)
            .await
            .map_err(ImportError::Database)?;

        Ok(result.rows_affected == 1)
    }

    async fn finalize(
        &self,
        tenant: &str,
        id: Uuid,
        finalization: &JobFinalization,
    ) -> Result<bool> {
        debug!(
            "Finalizing import job {} as {}",
            id, finalization.status
        );
        let completed_at: DateTimeWithTimeZone = finalization.completed_at.into();

        let result = entities::ImportJob::update_many()
            .col_expr(
                import_job::Column::Status,
                Expr::value(finalization.status.as_str()),
            )
            .col_expr(
                import_job::Column::ProcessedRecords,
                Expr::value(finalization.processed as i64),
            )
            .col_expr(
                import_job::Column::SuccessfulImports,
                Expr::value(finalization.successful as i64),
            )
            .col_expr(
                import_job::Column::FailedImports,
                Expr::value(finalization.failed as i64),
            )
            .col_expr(
                import_job::Column::ProgressPercentage,
                Expr::value(finalization.progress_percentage as i32),
            )
            .col_expr(
                import_job::Column::Errors,
                Expr::value(serde_json::to_string(&finalization.errors)?),
            )
            .col_expr(import_job::Column::CompletedAt, Expr::value(Some(completed_at)))
            .col_expr(
                import_job::Column::ProcessingTimeSeconds,
                Expr::value(Some(finalization.processing_time_seconds)),
            )
            .filter(Self::job_filter(tenant, id))
            .filter(import_job::Column::Status.is_in(ACTIVE_STATUSES))
            .exec(&self.db)
            .await
            .map_err(ImportError::Database)?;

        Ok(result.rows_affected == 1)
    }

    async fn transition(&self, tenant: &str, id: Uuid, to: ImportStatus) -> Result<ImportJob> {
        let allowed: Vec<&str> = to.predecessors().iter().map(|s| s.as_str()).collect();

        let mut update = entities::ImportJob::update_many()
            .col_expr(import_job::Column::Status, Expr::value(to.as_str()));
        if matches!(to, ImportStatus::Cancelled | ImportStatus::Failed) {
            let now: DateTimeWithTimeZone = Utc::now().into();
            update = update.col_expr(import_job::Column::CompletedAt, Expr::value(Some(now)));
        }

        let result = update
            .filter(Self::job_filter(tenant, id))
            .filter(import_job::Column::Status.is_in(allowed))
            .exec(&self.db)
            .await
            .map_err(ImportError::Database)?;

        let job = self.require_job(tenant, id).await?;
        if result.rows_affected == 0 {
            return Err(ImportError::invalid_state(format!(
                "Cannot transition import job {} from {} to {}",
                id, job.status, to
            )));
        }
        Ok(job)
    }

    async fn append_rollback_deltas(
        &self,
        tenant: &str,
        id: Uuid,
        deltas: &[RollbackDelta],
    ) -> Result<()> {
        if deltas.is_empty() {
            return Ok(());
        }

        let now: DateTimeWithTimeZone = Utc::now().into();
        let mut models = Vec::with_capacity(deltas.len());
        for delta in deltas {
            models.push(import_rollback_delta::ActiveModel {
                job_id: Set(id.to_string()),
                tenant_id: Set(tenant.to_string()),
                action: Set(delta.action.as_str().to_string()),
                entity_type: Set(delta.entity_type.clone()),
                entity_id: Set(delta.entity_id.clone()),
                prior_state: Set(delta
                    .prior_state
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?),
                batch_number: Set(delta.batch_number as i32),
                created_at: Set(now),
                ..Default::default()
            });
        }

        entities::ImportRollbackDelta::insert_many(models)
            .exec(&self.db)
            .await
            .map_err(ImportError::Database)?;

        Ok(())
    }

    async fn rollback_deltas(&self, tenant: &str, id: Uuid) -> Result<Vec<RollbackDelta>> {
        entities::ImportRollbackDelta::find()
            .filter(import_rollback_delta::Column::JobId.eq(id.to_string()))
            .filter(import_rollback_delta::Column::TenantId.eq(tenant))
            .order_by_asc(import_rollback_delta::Column::Id)
            .all(&self.db)
            .await
            .map_err(ImportError::Database)?
            .into_iter()
            .map(delta_from_model)
            .collect()
    }

    async fn list(&self, tenant: &str) -> Result<Vec<ImportJob>> {
        entities::ImportJob::find()
            .filter(import_job::Column::TenantId.eq(tenant))
            .order_by_desc(import_job::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(ImportError::Database)?
            .into_iter()
            .map(job_from_model)
            .collect()
    }
}
