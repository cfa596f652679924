//! Splits a job's rows into batch units and hands them to the work queue

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::job::ImportStatus;
use super::progress::ProgressAggregator;
use super::queue::{BatchUnit, WorkQueue};
use super::types::{BatchConfig, RawRow, TenantContext};
use crate::config::ImportSettings;
use crate::storage::jobs::JobStore;
use crate::utils::error::{ImportError, Result};

/// Boundaries of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub batch_number: usize,
    pub offset: usize,
    pub row_count: usize,
}

/// Contiguous, non-overlapping batches covering `0..total_rows`
pub fn plan_batches(total_rows: usize, batch_size: usize) -> Result<Vec<BatchPlan>> {
    if batch_size == 0 {
        return Err(ImportError::invalid_batch_config(
            "batch size must be greater than zero",
        ));
    }
    Ok((0..total_rows.div_ceil(batch_size))
        .map(|batch_number| {
            let offset = batch_number * batch_size;
            BatchPlan {
                batch_number,
                offset,
                row_count: batch_size.min(total_rows - offset),
            }
        })
        .collect())
}

#[derive(Clone)]
pub struct BatchScheduler {
    jobs: Arc<dyn JobStore>,
    aggregator: Arc<ProgressAggregator>,
    queue: Arc<dyn WorkQueue>,
    max_attempts: u32,
    time_budget: Duration,
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("max_attempts", &self.max_attempts)
            .field("time_budget", &self.time_budget)
            .finish()
    }
}

impl BatchScheduler {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        aggregator: Arc<ProgressAggregator>,
        queue: Arc<dyn WorkQueue>,
        settings: &ImportSettings,
    ) -> Self {
        Self {
            jobs,
            aggregator,
            queue,
            max_attempts: settings.max_attempts.max(1),
            time_budget: settings.batch_timeout(),
        }
    }

    /// Record the job's row count and batch layout, then dispatch every batch.
    ///
    /// Only pending jobs can be scheduled. A zero batch size, or no rows for a
    /// job that expected some, fails the job.
    pub async fn schedule(
        &self,
        ctx: &TenantContext,
        job_id: Uuid,
        rows: Vec<RawRow>,
        batch_size: usize,
    ) -> Result<BatchConfig> {
        let tenant = ctx.tenant_id.as_str();
        let job = self
            .jobs
            .get(tenant, job_id)
            .await?
            .ok_or_else(|| ImportError::job_not_found(job_id.to_string()))?;
        if job.status != ImportStatus::Pending {
            return Err(ImportError::invalid_state(format!(
                "Import job {} cannot be started from status {}",
                job_id, job.status
            )));
        }

        if rows.is_empty() && job.total_records > 0 {
            let err = ImportError::invalid_batch_config(format!(
                "expected {} rows but none were supplied",
                job.total_records
            ));
            self.fail(tenant, job_id, &err).await?;
            return Err(err);
        }

        let plans = match plan_batches(rows.len(), batch_size) {
            Ok(plans) => plans,
            Err(err) => {
                self.fail(tenant, job_id, &err).await?;
                return Err(err);
            }
        };

        if job.total_records != rows.len() as u64 {
            if job.total_records > 0 {
                warn!(
                    job_id = %job_id,
                    expected = job.total_records,
                    actual = rows.len(),
                    "Row count differs from the expected total"
                );
            }
            self.jobs
                .set_total_records(tenant, job_id, rows.len() as u64)
                .await?;
        }

        let config = BatchConfig {
            total_batches: plans.len(),
            total_rows: rows.len(),
            batch_size,
        };
        self.aggregator
            .store_batch_config(ctx, job_id, &config)
            .await?;

        if plans.is_empty() {
            self.aggregator.finalize_empty(ctx, job_id).await?;
            info!(job_id = %job_id, "Empty import completed");
            return Ok(config);
        }

        info!(
            tenant = %tenant,
            job_id = %job_id,
            total_rows = config.total_rows,
            total_batches = config.total_batches,
            batch_size,
            "Scheduling import batches"
        );

        let mut rows = rows.into_iter();
        for plan in plans {
            let chunk: Vec<RawRow> = rows.by_ref().take(plan.row_count).collect();
            self.queue
                .dispatch(BatchUnit {
                    ctx: ctx.clone(),
                    job_id,
                    batch_number: plan.batch_number,
                    offset: plan.offset,
                    rows: chunk,
                    attempt: 0,
                    max_attempts: self.max_attempts,
                    time_budget: self.time_budget,
                })
                .await?;
        }

        Ok(config)
    }

    async fn fail(&self, tenant: &str, job_id: Uuid, reason: &ImportError) -> Result<()> {
        warn!(job_id = %job_id, error = %reason, "Import job cannot be scheduled");
        self.jobs
            .transition(tenant, job_id, ImportStatus::Failed)
            .await?;
        Ok(())
    }
}
