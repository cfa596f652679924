//! Reverses a finished import by replaying its deltas backwards

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::job::ImportStatus;
use super::types::{DeltaAction, RollbackDelta, TenantContext};
use crate::storage::jobs::JobStore;
use crate::storage::records::RecordStore;
use crate::utils::error::{ImportError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub job_id: Uuid,
    /// Every delta was applied or already undone
    pub success: bool,
    pub applied: usize,
    /// Created entities that no longer existed
    pub skipped: usize,
    pub failed: usize,
    pub status: ImportStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct UndoTally {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl UndoTally {
    fn absorb(&mut self, other: UndoTally) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

enum DeltaOutcome {
    Applied,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct RollbackEngine {
    jobs: Arc<dyn JobStore>,
    records: Arc<dyn RecordStore>,
}

impl RollbackEngine {
    pub fn new(jobs: Arc<dyn JobStore>, records: Arc<dyn RecordStore>) -> Self {
        Self { jobs, records }
    }

    /// Undo every entity write of a terminal job, newest first.
    ///
    /// A delta that cannot be applied is logged and skipped; the job is only
    /// marked `rolled_back` when none failed, so the call can be repeated.
    pub async fn rollback(&self, ctx: &TenantContext, job_id: Uuid) -> Result<RollbackReport> {
        let tenant = ctx.tenant_id.as_str();
        let job = self
            .jobs
            .get(tenant, job_id)
            .await?
            .ok_or_else(|| ImportError::job_not_found(job_id.to_string()))?;

        if job.status == ImportStatus::RolledBack {
            return Ok(RollbackReport {
                job_id,
                success: true,
                applied: 0,
                skipped: 0,
                failed: 0,
                status: job.status,
            });
        }
        if !job.status.is_terminal() {
            return Err(ImportError::invalid_state(format!(
                "Import job {} is still {} and cannot be rolled back",
                job_id, job.status
            )));
        }

        let deltas = self.jobs.rollback_deltas(tenant, job_id).await?;
        let mut tally = self.undo_deltas(tenant, job_id, &deltas).await;

        let status = if tally.failed == 0 {
            let status = self
                .jobs
                .transition(tenant, job_id, ImportStatus::RolledBack)
                .await?
                .status;
            // A batch that was mid-commit when the job was cancelled appends
            // its deltas after the first read
            let current = self.jobs.rollback_deltas(tenant, job_id).await?;
            if let Some(late) = current.get(deltas.len()..).filter(|late| !late.is_empty()) {
                info!(
                    job_id = %job_id,
                    late = late.len(),
                    "Undoing deltas recorded during rollback"
                );
                tally.absorb(self.undo_deltas(tenant, job_id, late).await);
            }
            status
        } else {
            job.status
        };

        info!(
            tenant = %tenant,
            job_id = %job_id,
            applied = tally.applied,
            skipped = tally.skipped,
            failed = tally.failed,
            "Import rollback finished"
        );
        Ok(RollbackReport {
            job_id,
            success: tally.failed == 0,
            applied: tally.applied,
            skipped: tally.skipped,
            failed: tally.failed,
            status,
        })
    }

    /// Undo `deltas` newest first, logging and counting any that fail
    pub(crate) async fn undo_deltas(
        &self,
        tenant: &str,
        job_id: Uuid,
        deltas: &[RollbackDelta],
    ) -> UndoTally {
        let mut tally = UndoTally::default();
        for delta in deltas.iter().rev() {
            match self.undo(tenant, delta).await {
                Ok(DeltaOutcome::Applied) => tally.applied += 1,
                Ok(DeltaOutcome::Skipped) => tally.skipped += 1,
                Err(err) => {
                    warn!(
                        job_id = %job_id,
                        entity_type = %delta.entity_type,
                        entity_id = %delta.entity_id,
                        action = delta.action.as_str(),
                        error = %err,
                        "Could not undo import delta"
                    );
                    tally.failed += 1;
                }
            }
        }
        tally
    }

    async fn undo(&self, tenant: &str, delta: &RollbackDelta) -> Result<DeltaOutcome> {
        match delta.action {
            DeltaAction::Create => {
                let deleted = self
                    .records
                    .delete(tenant, &delta.entity_type, &delta.entity_id)
                    .await?;
                Ok(if deleted {
                    DeltaOutcome::Applied
                } else {
                    DeltaOutcome::Skipped
                })
            }
            DeltaAction::Update => {
                let prior = delta.prior_state.as_ref().ok_or_else(|| {
                    ImportError::internal(format!(
                        "update delta for {} has no prior state",
                        delta.entity_id
                    ))
                })?;
                self.records.restore(tenant, prior).await?;
                Ok(DeltaOutcome::Applied)
            }
        }
    }
}
