//! Batch worker: runs one batch inside one record transaction

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cancellation::CancellationController;
use super::capabilities::{FieldMapper, ValidationEngine};
use super::job::{ImportJob, ImportStatus};
use super::processor::{ProcessorRegistry, ProjectedRow, RowProcessor};
use super::progress::ProgressAggregator;
use super::queue::BatchUnit;
use super::rollback::RollbackEngine;
use super::sanitize::sanitize_row;
use super::types::{BatchResult, RawRow, RollbackDelta, RowError, RowWarning, TenantContext};
use crate::storage::jobs::JobStore;
use crate::storage::records::{RecordStore, RecordTransaction};
use crate::utils::error::{ImportError, Result};

/// Why a batch was not executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Cancelled,
    JobTerminal(ImportStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Completed(BatchResult),
    Skipped(SkipReason),
}

struct ProcessedRow {
    delta: RollbackDelta,
    warnings: Vec<String>,
}

/// Executes batches: map, validate, project and persist each row, then report
/// the batch result to the aggregator.
pub struct BatchWorker {
    jobs: Arc<dyn JobStore>,
    records: Arc<dyn RecordStore>,
    cancellation: CancellationController,
    aggregator: Arc<ProgressAggregator>,
    mapper: Arc<dyn FieldMapper>,
    validator: Arc<dyn ValidationEngine>,
    processors: ProcessorRegistry,
    rollback: RollbackEngine,
    preview_length: usize,
}

impl std::fmt::Debug for BatchWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchWorker")
            .field("processors", &self.processors)
            .field("preview_length", &self.preview_length)
            .finish()
    }
}

impl BatchWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jobs: Arc<dyn JobStore>,
        records: Arc<dyn RecordStore>,
        cancellation: CancellationController,
        aggregator: Arc<ProgressAggregator>,
        mapper: Arc<dyn FieldMapper>,
        validator: Arc<dyn ValidationEngine>,
        processors: ProcessorRegistry,
        preview_length: usize,
    ) -> Self {
        Self {
            rollback: RollbackEngine::new(jobs.clone(), records.clone()),
            jobs,
            records,
            cancellation,
            aggregator,
            mapper,
            validator,
            processors,
            preview_length,
        }
    }

    /// Run one attempt of a batch.
    ///
    /// Row-level problems are folded into the returned result. An `Err` means
    /// the whole attempt failed and nothing it wrote was committed.
    pub async fn process_batch(&self, unit: &BatchUnit) -> Result<BatchOutcome> {
        let tenant = unit.ctx.tenant_id.as_str();
        let job = self
            .jobs
            .get(tenant, unit.job_id)
            .await?
            .ok_or_else(|| ImportError::job_not_found(unit.job_id.to_string()))?;

        if job.status.is_terminal() {
            debug!(
                job_id = %unit.job_id,
                batch_number = unit.batch_number,
                status = %job.status,
                "Job is terminal, skipping batch"
            );
            return Ok(BatchOutcome::Skipped(SkipReason::JobTerminal(job.status)));
        }
        if self.cancellation.is_cancelled(&unit.ctx, unit.job_id).await? {
            info!(
                job_id = %unit.job_id,
                batch_number = unit.batch_number,
                "Job cancelled, skipping batch"
            );
            return Ok(BatchOutcome::Skipped(SkipReason::Cancelled));
        }

        let processor = self.processors.get(job.import_type)?;
        self.jobs
            .mark_processing(tenant, unit.job_id, Utc::now())
            .await?;

        debug!(
            job_id = %unit.job_id,
            batch_number = unit.batch_number,
            attempt = unit.attempt,
            rows = unit.rows.len(),
            "Processing batch"
        );

        let mut tx = self.records.begin(tenant).await?;
        let mut result = BatchResult::empty(unit.batch_number);
        let mut deltas = Vec::new();

        for (index, row) in unit.rows.iter().enumerate() {
            if index > 0 && self.cancellation.is_cancelled(&unit.ctx, unit.job_id).await? {
                info!(
                    job_id = %unit.job_id,
                    batch_number = unit.batch_number,
                    processed = result.processed,
                    "Cancellation observed, stopping batch early"
                );
                result.interrupted = true;
                break;
            }

            let row_number = unit.offset + index;
            let outcome = self
                .process_row(
                    &job,
                    processor.as_ref(),
                    tx.as_mut(),
                    row,
                    row_number,
                    unit.batch_number,
                )
                .await;
            match outcome {
                Ok(processed) => {
                    result.successful += 1;
                    deltas.push(processed.delta);
                    result.warnings.extend(
                        processed
                            .warnings
                            .into_iter()
                            .map(|message| RowWarning { row: row_number, message }),
                    );
                }
                Err(err) if err.is_retryable() => {
                    warn!(
                        job_id = %unit.job_id,
                        batch_number = unit.batch_number,
                        row = row_number,
                        error = %err,
                        "Systemic failure, abandoning batch attempt"
                    );
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!("Failed to roll back batch transaction: {}", rollback_err);
                    }
                    return Err(err);
                }
                Err(err) => {
                    result.failed += 1;
                    result.errors.push(RowError {
                        row: row_number,
                        message: err.to_string(),
                        data: sanitize_row(row, self.preview_length),
                    });
                }
            }
            result.processed += 1;
        }

        tx.commit().await.map_err(|err| {
            warn!(
                job_id = %unit.job_id,
                batch_number = unit.batch_number,
                error = %err,
                "Batch commit failed"
            );
            match err {
                ImportError::Transaction(_) => err,
                other => ImportError::transaction(other.to_string()),
            }
        })?;

        // The batch transaction holds its connection until here, so deltas follow the commit
        self.jobs
            .append_rollback_deltas(tenant, unit.job_id, &deltas)
            .await?;
        if !deltas.is_empty() && self.rolled_back_meanwhile(tenant, unit, &deltas).await? {
            return Ok(BatchOutcome::Skipped(SkipReason::JobTerminal(
                ImportStatus::RolledBack,
            )));
        }

        result.completed_at = Utc::now();
        self.aggregator
            .store_batch_result(&unit.ctx, unit.job_id, &result)
            .await?;
        self.aggregator
            .record_batch_completion(&unit.ctx, unit.job_id, &result)
            .await?;

        debug!(
            job_id = %unit.job_id,
            batch_number = unit.batch_number,
            successful = result.successful,
            failed = result.failed,
            "Batch committed"
        );
        Ok(BatchOutcome::Completed(result))
    }

    /// A job cancelled mid-batch can be rolled back before this batch's
    /// deltas were recorded; such writes are undone here.
    async fn rolled_back_meanwhile(
        &self,
        tenant: &str,
        unit: &BatchUnit,
        deltas: &[RollbackDelta],
    ) -> Result<bool> {
        match self.jobs.get(tenant, unit.job_id).await? {
            Some(job) if job.status == ImportStatus::RolledBack => {
                let tally = self.rollback.undo_deltas(tenant, unit.job_id, deltas).await;
                info!(
                    job_id = %unit.job_id,
                    batch_number = unit.batch_number,
                    applied = tally.applied,
                    failed = tally.failed,
                    "Job rolled back while the batch committed, undid its writes"
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn process_row(
        &self,
        job: &ImportJob,
        processor: &dyn RowProcessor,
        tx: &mut dyn RecordTransaction,
        row: &RawRow,
        row_number: usize,
        batch_number: usize,
    ) -> Result<ProcessedRow> {
        let mapped = self.mapper.apply_mappings(row, &job.field_mapping)?;
        let validation =
            self.validator
                .validate_row(&mapped, row_number, &job.field_mapping, job.import_type);
        if !validation.valid {
            return Err(ImportError::validation(validation.errors.join("; ")));
        }

        let projected = ProjectedRow::project(job.import_type, &mapped)?;
        let delta = processor.process(&projected, tx, batch_number).await?;
        Ok(ProcessedRow {
            delta,
            warnings: validation.warnings,
        })
    }

    /// Count a batch that ran out of attempts so the job can still finalize.
    ///
    /// An attempt that committed before failing left its result behind, and
    /// that result is what gets counted; otherwise every row counts as failed.
    pub async fn record_exhausted(&self, unit: &BatchUnit, error: &ImportError) -> Result<()> {
        let stored = self
            .aggregator
            .batch_result(&unit.ctx, unit.job_id, unit.batch_number)
            .await?;
        let result = match stored {
            Some(result) => result,
            None => {
                let result = self.exhausted_result(unit, error);
                self.aggregator
                    .store_batch_result(&unit.ctx, unit.job_id, &result)
                    .await?;
                result
            }
        };
        self.aggregator
            .record_batch_completion(&unit.ctx, unit.job_id, &result)
            .await?;
        Ok(())
    }

    fn exhausted_result(&self, unit: &BatchUnit, error: &ImportError) -> BatchResult {
        let message = format!(
            "batch {} failed after {} attempts: {}",
            unit.batch_number, unit.attempt, error
        );
        let mut result = BatchResult::empty(unit.batch_number);
        result.processed = unit.rows.len() as u64;
        result.failed = unit.rows.len() as u64;
        result.errors = unit
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| RowError {
                row: unit.offset + index,
                message: message.clone(),
                data: sanitize_row(row, self.preview_length),
            })
            .collect();
        result
    }

    /// Mark the job failed after a job-level error; no-op if it already ended
    pub async fn fail_job(&self, ctx: &TenantContext, job_id: Uuid, error: &ImportError) {
        match self.jobs.get(&ctx.tenant_id, job_id).await {
            Ok(Some(job)) if !job.status.is_terminal() => {
                match self
                    .jobs
                    .transition(&ctx.tenant_id, job_id, ImportStatus::Failed)
                    .await
                {
                    Ok(_) => warn!(job_id = %job_id, error = %error, "Import job failed"),
                    Err(err) => warn!(job_id = %job_id, "Could not mark job failed: {}", err),
                }
            }
            Ok(_) => {}
            Err(err) => warn!(job_id = %job_id, "Could not load job to mark it failed: {}", err),
        }
    }
}
