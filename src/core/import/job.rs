//! Import job model and status state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::types::{FieldMapping, ImportSummary, ImportType, RowError};
use crate::utils::error::ImportError;

/// Lifecycle status of an import job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Pending,
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
    Cancelled,
    /// Distinguished marker set after a successful rollback
    RolledBack,
}

impl ImportStatus {
    pub const ALL: [ImportStatus; 7] = [
        ImportStatus::Pending,
        ImportStatus::Processing,
        ImportStatus::Completed,
        ImportStatus::CompletedWithErrors,
        ImportStatus::Failed,
        ImportStatus::Cancelled,
        ImportStatus::RolledBack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
            ImportStatus::CompletedWithErrors => "completed_with_errors",
            ImportStatus::Failed => "failed",
            ImportStatus::Cancelled => "cancelled",
            ImportStatus::RolledBack => "rolled_back",
        }
    }

    /// No batch work may run once a job is terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ImportStatus::Pending | ImportStatus::Processing)
    }

    pub fn can_transition_to(&self, next: ImportStatus) -> bool {
        use ImportStatus::*;
        match (self, next) {
            (Pending, Processing) => true,
            (Pending | Processing, Completed | CompletedWithErrors | Failed | Cancelled) => true,
            (Completed | CompletedWithErrors | Failed | Cancelled, RolledBack) => true,
            _ => false,
        }
    }

    /// States from which `self` can be entered
    pub fn predecessors(&self) -> Vec<ImportStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(*self))
            .collect()
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ImportError::internal(format!("Unknown import status: {}", s)))
    }
}

/// One row-import session for one tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub tenant_id: String,
    pub import_type: ImportType,
    pub status: ImportStatus,
    pub total_records: u64,
    pub processed_records: u64,
    pub successful_imports: u64,
    pub failed_imports: u64,
    pub progress_percentage: u8,
    pub field_mapping: FieldMapping,
    /// Sampled row errors, written at finalization
    pub errors: Vec<RowError>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_seconds: Option<f64>,
}

impl ImportJob {
    pub fn new(
        tenant_id: impl Into<String>,
        import_type: ImportType,
        field_mapping: FieldMapping,
        total_records: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            import_type,
            status: ImportStatus::Pending,
            total_records,
            processed_records: 0,
            successful_imports: 0,
            failed_imports: 0,
            progress_percentage: 0,
            field_mapping,
            errors: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            processing_time_seconds: None,
        }
    }
}

/// `floor(processed * 100 / total)`, clamped to 100; an empty job counts as done
pub fn progress_percentage(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (processed.min(total) * 100 / total) as u8
}

/// Running counters persisted to the durable job record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobProgress {
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub percentage: u8,
}

/// Terminal write applied by the aggregator once every batch reported
#[derive(Debug, Clone, PartialEq)]
pub struct JobFinalization {
    pub status: ImportStatus,
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub progress_percentage: u8,
    pub errors: Vec<RowError>,
    pub completed_at: DateTime<Utc>,
    pub processing_time_seconds: f64,
}

/// Status read model returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub import_type: ImportType,
    pub status: ImportStatus,
    pub progress_percentage: u8,
    pub processed_records: u64,
    pub total_records: u64,
    pub successful_imports: u64,
    pub failed_imports: u64,
    pub errors: Vec<RowError>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_seconds: Option<f64>,
}

impl JobStatusView {
    pub fn from_job(job: &ImportJob) -> Self {
        Self {
            job_id: job.id,
            import_type: job.import_type,
            status: job.status,
            progress_percentage: job.progress_percentage,
            processed_records: job.processed_records,
            total_records: job.total_records,
            successful_imports: job.successful_imports,
            failed_imports: job.failed_imports,
            errors: job.errors.clone(),
            started_at: job.started_at,
            completed_at: job.completed_at,
            processing_time_seconds: job.processing_time_seconds,
        }
    }

    /// Overlay the live cache summary of an active job; counters never move backwards
    pub fn with_live_summary(mut self, summary: &ImportSummary) -> Self {
        if summary.total_processed > self.processed_records {
            self.processed_records = summary.total_processed.min(self.total_records);
            self.successful_imports = summary.total_successful;
            self.failed_imports = summary.total_failed;
            self.progress_percentage =
                progress_percentage(self.processed_records, self.total_records)
                    .max(self.progress_percentage);
        }
        self
    }
}
