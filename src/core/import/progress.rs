//! Cache-backed progress aggregation and job finalization
//!
//! Batch workers report here after committing. Counters live in a cache hash
//! updated with atomic increments; the durable job record is written each
//! time the percentage crosses a persistence step, and once more at
//! finalization.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::job::{ImportStatus, JobFinalization, JobProgress, progress_percentage};
use super::keys::CacheKeys;
use super::types::{BatchConfig, BatchResult, ImportSummary, RowError, TenantContext};
use crate::config::ImportSettings;
use crate::storage::cache::SharedCache;
use crate::storage::jobs::JobStore;
use crate::utils::error::{ImportError, Result};

const COMPLETED_BATCHES: &str = "completed_batches";
const TOTAL_PROCESSED: &str = "total_processed";
const TOTAL_SUCCESSFUL: &str = "total_successful";
const TOTAL_FAILED: &str = "total_failed";
const LAST_UPDATED: &str = "last_updated";

/// What a call to [`ProgressAggregator::record_batch_completion`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    /// False when the batch had already been counted
    pub counted: bool,
    /// Whether the durable job record received new counters
    pub persisted: bool,
    /// Whether this call finalized the job
    pub finalized: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    cache: Arc<dyn SharedCache>,
    jobs: Arc<dyn JobStore>,
    result_ttl: Duration,
    persist_step_percent: u8,
    max_error_samples: usize,
}

impl ProgressAggregator {
    pub fn new(
        cache: Arc<dyn SharedCache>,
        jobs: Arc<dyn JobStore>,
        settings: &ImportSettings,
    ) -> Self {
        Self {
            cache,
            jobs,
            result_ttl: settings.result_ttl(),
            persist_step_percent: settings.persist_step_percent.clamp(1, 100),
            max_error_samples: settings.max_error_samples,
        }
    }

    pub async fn store_batch_config(
        &self,
        ctx: &TenantContext,
        job_id: Uuid,
        config: &BatchConfig,
    ) -> Result<()> {
        let keys = CacheKeys::new(ctx, job_id);
        self.cache
            .set(
                &keys.batch_config(),
                &serde_json::to_string(config)?,
                self.result_ttl,
            )
            .await
    }

    pub async fn batch_config(
        &self,
        ctx: &TenantContext,
        job_id: Uuid,
    ) -> Result<Option<BatchConfig>> {
        let keys = CacheKeys::new(ctx, job_id);
        match self.cache.get(&keys.batch_config()).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Write (or overwrite) the cached result of one batch
    pub async fn store_batch_result(
        &self,
        ctx: &TenantContext,
        job_id: Uuid,
        result: &BatchResult,
    ) -> Result<()> {
        let keys = CacheKeys::new(ctx, job_id);
        self.cache
            .set(
                &keys.batch_result(result.batch_number),
                &serde_json::to_string(result)?,
                self.result_ttl,
            )
            .await
    }

    pub async fn batch_result(
        &self,
        ctx: &TenantContext,
        job_id: Uuid,
        batch_number: usize,
    ) -> Result<Option<BatchResult>> {
        let keys = CacheKeys::new(ctx, job_id);
        match self.cache.get(&keys.batch_result(batch_number)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Current cached summary (all zeros once finalized or never started)
    pub async fn summary(&self, ctx: &TenantContext, job_id: Uuid) -> Result<ImportSummary> {
        let keys = CacheKeys::new(ctx, job_id);
        let fields = self.cache.hash_get_all(&keys.batch_summary()).await?;
        let counter = |name: &str| -> u64 {
            fields
                .get(name)
                .and_then(|raw| raw.parse::<i64>().ok())
                .map(|value| value.max(0) as u64)
                .unwrap_or(0)
        };

        Ok(ImportSummary {
            completed_batches: counter(COMPLETED_BATCHES),
            total_processed: counter(TOTAL_PROCESSED),
            total_successful: counter(TOTAL_SUCCESSFUL),
            total_failed: counter(TOTAL_FAILED),
            last_updated: fields
                .get(LAST_UPDATED)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|at| at.with_timezone(&Utc)),
        })
    }

    /// Count a finished batch once, persist progress on threshold crossings,
    /// and finalize the job when every batch has reported.
    ///
    /// A repeated report of a counted batch changes no counter but still runs
    /// the persistence and finalization checks, so an attempt that failed
    /// after counting can be retried to completion.
    pub async fn record_batch_completion(
        &self,
        ctx: &TenantContext,
        job_id: Uuid,
        result: &BatchResult,
    ) -> Result<CompletionOutcome> {
        let keys = CacheKeys::new(ctx, job_id);
        let now = Utc::now().to_rfc3339();

        let applied = self
            .cache
            .hash_increment_once(
                &keys.batch_summary(),
                &counted_marker(result.batch_number),
                &[
                    (TOTAL_PROCESSED, result.processed as i64),
                    (TOTAL_SUCCESSFUL, result.successful as i64),
                    (TOTAL_FAILED, result.failed as i64),
                    (COMPLETED_BATCHES, 1),
                ],
                &[(LAST_UPDATED, now.as_str())],
                self.result_ttl,
            )
            .await?;

        let counted = applied.is_some();
        let totals = match applied {
            Some(values) => {
                let value = |i: usize| values.get(i).copied().unwrap_or(0).max(0) as u64;
                ImportSummary {
                    total_processed: value(0),
                    total_successful: value(1),
                    total_failed: value(2),
                    completed_batches: value(3),
                    last_updated: None,
                }
            }
            None => {
                debug!(
                    job_id = %job_id,
                    batch_number = result.batch_number,
                    "Batch already counted, rechecking finalization"
                );
                self.summary(ctx, job_id).await?
            }
        };

        let Some(config) = self.batch_config(ctx, job_id).await? else {
            warn!(
                job_id = %job_id,
                "Batch configuration missing from cache, cannot compute progress"
            );
            return Ok(CompletionOutcome {
                counted,
                persisted: false,
                finalized: false,
            });
        };

        let processed = totals.total_processed.min(config.total_rows as u64);
        let progress = JobProgress {
            processed,
            successful: totals.total_successful,
            failed: totals.total_failed,
            percentage: progress_percentage(processed, config.total_rows as u64),
        };
        debug!(
            job_id = %job_id,
            batch_number = result.batch_number,
            completed_batches = totals.completed_batches,
            percentage = progress.percentage,
            "Batch completion recorded"
        );

        let persisted = self
            .persist_on_threshold(ctx, job_id, &keys, &progress)
            .await?;

        let finalized = if totals.completed_batches as usize >= config.total_batches {
            self.finalize(ctx, job_id, &config).await?
        } else {
            false
        };

        Ok(CompletionOutcome {
            counted,
            persisted,
            finalized,
        })
    }

    /// Persist when the percentage moves past the last persisted step. The
    /// step marker is advanced with compare-and-swap so concurrent reporters
    /// never persist the same step twice or regress it.
    async fn persist_on_threshold(
        &self,
        ctx: &TenantContext,
        job_id: Uuid,
        keys: &CacheKeys,
        progress: &JobProgress,
    ) -> Result<bool> {
        let step = self.persist_step_percent;
        let threshold = if progress.percentage >= 100 {
            100
        } else {
            progress.percentage - progress.percentage % step
        };
        if threshold == 0 {
            return Ok(false);
        }

        let progress_key = keys.import_progress();
        loop {
            let last = self.cache.get(&progress_key).await?;
            let last_persisted = last
                .as_deref()
                .and_then(|raw| raw.parse::<u8>().ok())
                .unwrap_or(0);
            if threshold <= last_persisted {
                return Ok(false);
            }

            let swapped = self
                .cache
                .compare_and_swap(
                    &progress_key,
                    last.as_deref(),
                    &threshold.to_string(),
                    self.result_ttl,
                )
                .await?;
            if swapped {
                let applied = self
                    .jobs
                    .update_progress(&ctx.tenant_id, job_id, progress)
                    .await?;
                debug!(
                    job_id = %job_id,
                    threshold,
                    applied,
                    "Progress threshold crossed"
                );
                return Ok(applied);
            }
        }
    }

    async fn collect_error_samples(
        &self,
        ctx: &TenantContext,
        job_id: Uuid,
        total_batches: usize,
    ) -> Result<Vec<RowError>> {
        let mut errors = Vec::new();
        for batch_number in 0..total_batches {
            if errors.len() >= self.max_error_samples {
                break;
            }
            if let Some(result) = self.batch_result(ctx, job_id, batch_number).await? {
                errors.extend(result.errors);
            }
        }
        errors.sort_by_key(|error| error.row);
        errors.truncate(self.max_error_samples);
        Ok(errors)
    }

    /// Write the terminal status and counters, then drop transient cache
    /// entries. A no-op for jobs that are already terminal.
    pub async fn finalize(
        &self,
        ctx: &TenantContext,
        job_id: Uuid,
        config: &BatchConfig,
    ) -> Result<bool> {
        let job = self
            .jobs
            .get(&ctx.tenant_id, job_id)
            .await?
            .ok_or_else(|| ImportError::job_not_found(job_id.to_string()))?;
        if job.status.is_terminal() {
            debug!(
                job_id = %job_id,
                status = %job.status,
                "Job already terminal, skipping finalization"
            );
            return Ok(false);
        }

        let summary = self.summary(ctx, job_id).await?;
        let errors = self
            .collect_error_samples(ctx, job_id, config.total_batches)
            .await?;
        let processed = summary.total_processed.min(job.total_records);
        let completed_at = Utc::now();
        let finalization = JobFinalization {
            status: if summary.total_failed == 0 {
                ImportStatus::Completed
            } else {
                ImportStatus::CompletedWithErrors
            },
            processed,
            successful: summary.total_successful,
            failed: summary.total_failed,
            progress_percentage: progress_percentage(processed, job.total_records),
            errors,
            completed_at,
            processing_time_seconds: elapsed_seconds(job.started_at, completed_at),
        };

        if !self
            .jobs
            .finalize(&ctx.tenant_id, job_id, &finalization)
            .await?
        {
            return Ok(false);
        }

        let keys = CacheKeys::new(ctx, job_id);
        self.cache.delete(&keys.transient(config.total_batches)).await?;

        info!(
            tenant = %ctx.tenant_id,
            job_id = %job_id,
            status = %finalization.status,
            processed = finalization.processed,
            failed = finalization.failed,
            "Import job finalized"
        );
        Ok(true)
    }

    /// Finalize a job that has no rows at all
    pub async fn finalize_empty(&self, ctx: &TenantContext, job_id: Uuid) -> Result<bool> {
        let started_at = self
            .jobs
            .get(&ctx.tenant_id, job_id)
            .await?
            .and_then(|job| job.started_at);
        let completed_at = Utc::now();
        let finalization = JobFinalization {
            status: ImportStatus::Completed,
            processed: 0,
            successful: 0,
            failed: 0,
            progress_percentage: 100,
            errors: Vec::new(),
            completed_at,
            processing_time_seconds: elapsed_seconds(started_at, completed_at),
        };
        let finalized = self
            .jobs
            .finalize(&ctx.tenant_id, job_id, &finalization)
            .await?;
        if finalized {
            let keys = CacheKeys::new(ctx, job_id);
            self.cache.delete(&keys.transient(0)).await?;
        }
        Ok(finalized)
    }
}

/// Summary-hash field recording that a batch has been counted
fn counted_marker(batch_number: usize) -> String {
    format!("counted:{}", batch_number)
}

fn elapsed_seconds(started_at: Option<DateTime<Utc>>, completed_at: DateTime<Utc>) -> f64 {
    started_at
        .map(|start| (completed_at - start).num_milliseconds().max(0) as f64 / 1000.0)
        .unwrap_or(0.0)
}
