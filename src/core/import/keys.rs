//! Tenant-namespaced cache keys of one import job

use uuid::Uuid;

use super::types::TenantContext;

/// Builds every cache key the pipeline uses for a job
#[derive(Debug, Clone)]
pub struct CacheKeys {
    tenant: String,
    job_id: Uuid,
}

impl CacheKeys {
    pub fn new(ctx: &TenantContext, job_id: Uuid) -> Self {
        Self {
            tenant: ctx.tenant_id.clone(),
            job_id,
        }
    }

    pub fn batch_result(&self, batch_number: usize) -> String {
        format!(
            "{}:batch_result:{}:{}",
            self.tenant, self.job_id, batch_number
        )
    }

    pub fn batch_summary(&self) -> String {
        format!("{}:batch_summary:{}", self.tenant, self.job_id)
    }

    /// Holds the last progress percentage persisted to the job record
    pub fn import_progress(&self) -> String {
        format!("{}:import_progress:{}", self.tenant, self.job_id)
    }

    pub fn batch_config(&self) -> String {
        format!("{}:batch_config:{}", self.tenant, self.job_id)
    }

    pub fn import_cancelled(&self) -> String {
        format!("{}:import_cancelled:{}", self.tenant, self.job_id)
    }

    /// Everything removed at finalization
    pub fn transient(&self, total_batches: usize) -> Vec<String> {
        let mut keys = Vec::with_capacity(total_batches + 3);
        for batch_number in 0..total_batches {
            keys.push(self.batch_result(batch_number));
        }
        keys.push(self.batch_summary());
        keys.push(self.import_progress());
        keys.push(self.batch_config());
        keys
    }
}
