//! In-memory job store

use super::JobStore;
use crate::core::import::job::{ImportJob, ImportStatus, JobFinalization, JobProgress};
use crate::core::import::types::RollbackDelta;
use crate::utils::error::{ImportError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug)]
struct StoredJob {
    job: ImportJob,
    deltas: Vec<RollbackDelta>,
}

/// Job store kept in process memory behind a single lock
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<(String, Uuid), StoredJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_job<T>(
        &self,
        tenant: &str,
        id: Uuid,
        f: impl FnOnce(&mut StoredJob) -> Result<T>,
    ) -> Result<T> {
        let mut jobs = self.jobs.write();
        let stored = jobs
            .get_mut(&(tenant.to_string(), id))
            .ok_or_else(|| ImportError::job_not_found(id.to_string()))?;
        f(stored)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &ImportJob) -> Result<()> {
        let mut jobs = self.jobs.write();
        let key = (job.tenant_id.clone(), job.id);
        if jobs.contains_key(&key) {
            return Err(ImportError::invalid_state(format!(
                "Import job {} already exists",
                job.id
            )));
        }
        jobs.insert(
            key,
            StoredJob {
                job: job.clone(),
                deltas: Vec::new(),
            },
        );
        Ok(())
    }

    async fn get(&self, tenant: &str, id: Uuid) -> Result<Option<ImportJob>> {
        Ok(self
            .jobs
            .read()
            .get(&(tenant.to_string(), id))
            .map(|stored| stored.job.clone()))
    }

    async fn set_total_records(&self, tenant: &str, id: Uuid, total: u64) -> Result<()> {
        self.with_job(tenant, id, |stored| {
            stored.job.total_records = total;
            Ok(())
        })
    }

    async fn mark_processing(&self, tenant: &str, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.with_job(tenant, id, |stored| {
            if stored.job.status != ImportStatus::Pending {
                return Ok(false);
            }
            stored.job.status = ImportStatus::Processing;
            stored.job.started_at = Some(at);
            Ok(true)
        })
    }

    async fn update_progress(
        &self,
        tenant: &str,
        id: Uuid,
        progress: &JobProgress,
    ) -> Result<bool> {
        self.with_job(tenant, id, |stored| {
            let job = &mut stored.job;
            if job.status.is_terminal() || progress.processed <= job.processed_records {
                return Ok(false);
            }
            job.processed_records = progress.processed;
            job.successful_imports = progress.successful;
            job.failed_imports = progress.failed;
            job.progress_percentage = progress.percentage.max(job.progress_percentage);
            Ok(true)
        })
    }

    async fn finalize(
        &self,
        tenant: &str,
        id: Uuid,
        finalization: &JobFinalization,
    ) -> Result<bool> {
        self.with_job(tenant, id, |stored| {
            let job = &mut stored.job;
            if job.status.is_terminal() {
                return Ok(false);
            }
            job.status = finalization.status;
            job.processed_records = finalization.processed;
            job.successful_imports = finalization.successful;
            job.failed_imports = finalization.failed;
            job.progress_percentage = finalization.progress_percentage;
            job.errors = finalization.errors.clone();
            job.completed_at = Some(finalization.completed_at);
            job.processing_time_seconds = Some(finalization.processing_time_seconds);
            Ok(true)
        })
    }

    async fn transition(&self, tenant: &str, id: Uuid, to: ImportStatus) -> Result<ImportJob> {
        self.with_job(tenant, id, |stored| {
            let job = &mut stored.job;
            if !job.status.can_transition_to(to) {
                return Err(ImportError::invalid_state(format!(
                    "Cannot transition import job {} from {} to {}",
                    id, job.status, to
                )));
            }
            job.status = to;
            if matches!(to, ImportStatus::Cancelled | ImportStatus::Failed) {
                job.completed_at = Some(Utc::now());
            }
            Ok(job.clone())
        })
    }

    async fn append_rollback_deltas(
        &self,
        tenant: &str,
        id: Uuid,
        deltas: &[RollbackDelta],
    ) -> Result<()> {
        self.with_job(tenant, id, |stored| {
            stored.deltas.extend_from_slice(deltas);
            Ok(())
        })
    }

    async fn rollback_deltas(&self, tenant: &str, id: Uuid) -> Result<Vec<RollbackDelta>> {
        self.jobs
            .read()
            .get(&(tenant.to_string(), id))
            .map(|stored| stored.deltas.clone())
            .ok_or_else(|| ImportError::job_not_found(id.to_string()))
    }

    async fn list(&self, tenant: &str) -> Result<Vec<ImportJob>> {
        let mut jobs: Vec<ImportJob> = self
            .jobs
            .read()
            .iter()
            .filter(|((owner, _), _)| owner == tenant)
            .map(|(_, stored)| stored.job.clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}
