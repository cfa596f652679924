//! Cooperative cancellation flag

use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::job::{ImportJob, ImportStatus};
use super::keys::CacheKeys;
use super::types::TenantContext;
use crate::storage::cache::SharedCache;
use crate::storage::jobs::JobStore;
use crate::utils::error::Result;

/// Sets and polls the per-job cancellation flag.
///
/// Workers check the flag before a batch and between rows; nothing is
/// interrupted mid-row.
#[derive(Debug, Clone)]
pub struct CancellationController {
    cache: Arc<dyn SharedCache>,
    jobs: Arc<dyn JobStore>,
    ttl: Duration,
}

impl CancellationController {
    pub fn new(cache: Arc<dyn SharedCache>, jobs: Arc<dyn JobStore>, ttl: Duration) -> Self {
        Self { cache, jobs, ttl }
    }

    /// Flag the job and move it to `cancelled`. Fails with `InvalidState` once
    /// the job is terminal.
    pub async fn request_cancellation(
        &self,
        ctx: &TenantContext,
        job_id: Uuid,
    ) -> Result<ImportJob> {
        let job = self
            .jobs
            .transition(&ctx.tenant_id, job_id, ImportStatus::Cancelled)
            .await?;

        let keys = CacheKeys::new(ctx, job_id);
        self.cache
            .set(&keys.import_cancelled(), "1", self.ttl)
            .await?;

        info!(tenant = %ctx.tenant_id, job_id = %job_id, "Import cancellation requested");
        Ok(job)
    }

    pub async fn is_cancelled(&self, ctx: &TenantContext, job_id: Uuid) -> Result<bool> {
        self.cache
            .exists(&CacheKeys::new(ctx, job_id).import_cancelled())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::import::types::{FieldMapping, ImportType};
    use crate::storage::cache::MemoryCache;
    use crate::storage::jobs::MemoryJobStore;
    use crate::utils::error::ImportError;

    #[tokio::test]
    async fn test_cancel_sets_flag_and_status() {
        let cache = Arc::new(MemoryCache::new());
        let jobs = Arc::new(MemoryJobStore::new());
        let controller =
            CancellationController::new(cache.clone(), jobs.clone(), Duration::from_secs(60));

        let ctx = TenantContext::new("acme");
        let job = ImportJob::new("acme", ImportType::Menu, FieldMapping::new(), 10);
        jobs.create(&job).await.unwrap();

        assert!(!controller.is_cancelled(&ctx, job.id).await.unwrap());
        let cancelled = controller.request_cancellation(&ctx, job.id).await.unwrap();
        assert_eq!(cancelled.status, ImportStatus::Cancelled);
        assert!(controller.is_cancelled(&ctx, job.id).await.unwrap());

        // Flags are tenant-scoped
        let other = TenantContext::new("globex");
        assert!(!controller.is_cancelled(&other, job.id).await.unwrap());

        let err = controller
            .request_cancellation(&ctx, job.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::InvalidState(_)));
    }
}
