//! Durable import job records

mod memory;

pub use memory::MemoryJobStore;

use crate::core::import::job::{ImportJob, ImportStatus, JobFinalization, JobProgress};
use crate::core::import::types::RollbackDelta;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use uuid::Uuid;

/// Persistence for import jobs and their rollback deltas.
///
/// Mutations that race between concurrent batches are conditional on the
/// stored state, so a late or duplicate writer never moves a job backwards.
#[async_trait]
pub trait JobStore: Send + Sync + Debug {
    async fn create(&self, job: &ImportJob) -> Result<()>;

    async fn get(&self, tenant: &str, id: Uuid) -> Result<Option<ImportJob>>;

    async fn set_total_records(&self, tenant: &str, id: Uuid, total: u64) -> Result<()>;

    /// `pending -> processing`, stamping `started_at`. Returns false if the job
    /// was not pending.
    async fn mark_processing(&self, tenant: &str, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// Applied only when `processed` grows and the job is still active
    async fn update_progress(&self, tenant: &str, id: Uuid, progress: &JobProgress)
    -> Result<bool>;

    /// Terminal write; returns whether this call moved the job out of an active state
    async fn finalize(&self, tenant: &str, id: Uuid, finalization: &JobFinalization)
    -> Result<bool>;

    /// State-machine checked status change
    async fn transition(&self, tenant: &str, id: Uuid, to: ImportStatus) -> Result<ImportJob>;

    async fn append_rollback_deltas(
        &self,
        tenant: &str,
        id: Uuid,
        deltas: &[RollbackDelta],
    ) -> Result<()>;

    /// Deltas in insertion order
    async fn rollback_deltas(&self, tenant: &str, id: Uuid) -> Result<Vec<RollbackDelta>>;

    /// Jobs of a tenant, newest first
    async fn list(&self, tenant: &str) -> Result<Vec<ImportJob>>;
}
