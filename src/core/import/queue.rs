//! Work queue executing batch units with bounded concurrency and retries

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::types::{RawRow, TenantContext};
use super::worker::{BatchOutcome, BatchWorker};
use crate::config::ImportSettings;
use crate::utils::error::{ImportError, Result};

/// One schedulable batch of one job
#[derive(Debug, Clone)]
pub struct BatchUnit {
    pub ctx: TenantContext,
    pub job_id: Uuid,
    /// Zero-based
    pub batch_number: usize,
    /// Absolute index of the first row
    pub offset: usize,
    pub rows: Vec<RawRow>,
    /// Attempts made so far
    pub attempt: u32,
    pub max_attempts: u32,
    pub time_budget: Duration,
}

/// A batch unit given up on after its last attempt
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub tenant_id: String,
    pub job_id: Uuid,
    pub batch_number: usize,
    pub offset: usize,
    pub row_count: usize,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    fn new(unit: &BatchUnit, error: &ImportError) -> Self {
        Self {
            tenant_id: unit.ctx.tenant_id.clone(),
            job_id: unit.job_id,
            batch_number: unit.batch_number,
            offset: unit.offset,
            row_count: unit.rows.len(),
            attempts: unit.attempt,
            error: error.to_string(),
            failed_at: Utc::now(),
        }
    }
}

/// Exponential backoff between attempts of the same unit
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay added or removed at random
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn from_settings(settings: &ImportSettings) -> Self {
        Self {
            base_delay: settings.retry_backoff(),
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay
            .saturating_mul(2u32.pow(exponent))
            .min(self.max_delay);
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        delay.mul_f64(factor.max(0.0))
    }
}

/// Delivery of batch units to workers
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn dispatch(&self, unit: BatchUnit) -> Result<()>;

    /// Resolves once every dispatched unit has finished or been dead-lettered
    async fn wait_idle(&self);

    fn dead_letters(&self) -> Vec<DeadLetter>;
}

/// In-process queue: each unit runs on its own task, gated by a semaphore
#[derive(Debug, Clone)]
pub struct LocalWorkQueue {
    worker: Arc<BatchWorker>,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
}

impl LocalWorkQueue {
    pub fn new(worker: Arc<BatchWorker>, concurrency: usize, retry: RetryPolicy) -> Self {
        Self {
            worker,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            retry,
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
            dead_letters: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    async fn run_unit(
        worker: Arc<BatchWorker>,
        retry: RetryPolicy,
        dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
        mut unit: BatchUnit,
    ) {
        loop {
            unit.attempt += 1;
            let outcome =
                match tokio::time::timeout(unit.time_budget, worker.process_batch(&unit)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ImportError::timeout(format!(
                        "batch {} exceeded its time budget of {:?}",
                        unit.batch_number, unit.time_budget
                    ))),
                };

            match outcome {
                Ok(BatchOutcome::Completed(result)) => {
                    debug!(
                        job_id = %unit.job_id,
                        batch_number = unit.batch_number,
                        attempt = unit.attempt,
                        failed = result.failed,
                        "Batch unit completed"
                    );
                    return;
                }
                Ok(BatchOutcome::Skipped(reason)) => {
                    info!(
                        job_id = %unit.job_id,
                        batch_number = unit.batch_number,
                        "Batch unit skipped: {:?}",
                        reason
                    );
                    return;
                }
                Err(err) if err.is_job_level() => {
                    warn!(
                        job_id = %unit.job_id,
                        batch_number = unit.batch_number,
                        error = %err,
                        "Dropping batch unit"
                    );
                    worker.fail_job(&unit.ctx, unit.job_id, &err).await;
                    return;
                }
                Err(err) if err.is_retryable() && unit.attempt < unit.max_attempts => {
                    let delay = retry.delay_for(unit.attempt);
                    warn!(
                        job_id = %unit.job_id,
                        batch_number = unit.batch_number,
                        attempt = unit.attempt,
                        max_attempts = unit.max_attempts,
                        error = %err,
                        "Batch attempt failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    error!(
                        job_id = %unit.job_id,
                        batch_number = unit.batch_number,
                        attempts = unit.attempt,
                        error = %err,
                        "Batch unit dead-lettered"
                    );
                    dead_letters.lock().push(DeadLetter::new(&unit, &err));
                    Self::settle_exhausted(&worker, retry, &unit, &err).await;
                    return;
                }
            }
        }
    }

    /// Count a dead-lettered unit toward its job. If even that keeps failing
    /// the job is marked failed so it cannot stay `processing`.
    async fn settle_exhausted(
        worker: &BatchWorker,
        retry: RetryPolicy,
        unit: &BatchUnit,
        err: &ImportError,
    ) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match worker.record_exhausted(unit, err).await {
                Ok(()) => return,
                Err(record_err) if attempt < unit.max_attempts => {
                    let delay = retry.delay_for(attempt);
                    warn!(
                        job_id = %unit.job_id,
                        batch_number = unit.batch_number,
                        error = %record_err,
                        "Failed to record exhausted batch, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(record_err) => {
                    error!(
                        job_id = %unit.job_id,
                        batch_number = unit.batch_number,
                        error = %record_err,
                        "Could not record exhausted batch"
                    );
                    worker.fail_job(&unit.ctx, unit.job_id, &record_err).await;
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl WorkQueue for LocalWorkQueue {
    async fn dispatch(&self, unit: BatchUnit) -> Result<()> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);

        let permits = self.permits.clone();
        let worker = self.worker.clone();
        let retry = self.retry;
        let dead_letters = self.dead_letters.clone();
        let in_flight = self.in_flight.clone();
        let idle = self.idle.clone();

        tokio::spawn(async move {
            match permits.acquire_owned().await {
                Ok(_permit) => Self::run_unit(worker, retry, dead_letters, unit).await,
                Err(err) => error!("Work queue closed: {}", err),
            }
            if in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
                idle.notify_waiters();
            }
        });
        Ok(())
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            jitter: 0.0,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(40), Duration::from_millis(350));
    }

    #[test]
    fn test_retry_delay_jitter_stays_in_range() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        };
        for _ in 0..50 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(899));
            assert!(delay <= Duration::from_millis(1101));
        }
    }
}
