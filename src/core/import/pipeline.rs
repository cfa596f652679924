//! Import pipeline facade
//!
//! Wires the scheduler, worker, queue, aggregator, cancellation and rollback
//! components over a [`StorageLayer`] and exposes the operations callers use.
//! Every call is scoped by an explicit [`TenantContext`].

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::cancellation::CancellationController;
use super::capabilities::{FieldMapper, FileParser, ParseOptions, ValidationEngine};
use super::job::{ImportJob, JobStatusView};
use super::mapping::ColumnFieldMapper;
use super::processor::ProcessorRegistry;
use super::progress::ProgressAggregator;
use super::queue::{DeadLetter, LocalWorkQueue, RetryPolicy, WorkQueue};
use super::rollback::{RollbackEngine, RollbackReport};
use super::scheduler::BatchScheduler;
use super::types::{BatchConfig, BatchResult, FieldMapping, ImportType, RawRow, TenantContext};
use super::validation::RuleValidationEngine;
use super::worker::BatchWorker;
use crate::config::ImportSettings;
use crate::storage::StorageLayer;
use crate::utils::error::{ImportError, Result};

/// Rows inspected when auto-detecting a mapping
const DETECTION_SAMPLE_ROWS: usize = 5;
/// Detected mappings scoring below this are logged as unreliable
const LOW_CONFIDENCE: u8 = 50;

#[derive(Clone)]
pub struct ImportPipeline {
    settings: ImportSettings,
    storage: StorageLayer,
    mapper: Arc<dyn FieldMapper>,
    aggregator: Arc<ProgressAggregator>,
    cancellation: CancellationController,
    scheduler: BatchScheduler,
    rollback: RollbackEngine,
    queue: Arc<LocalWorkQueue>,
}

impl std::fmt::Debug for ImportPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportPipeline")
            .field("settings", &self.settings)
            .field("storage", &self.storage)
            .field("in_flight", &self.queue.in_flight())
            .finish()
    }
}

impl ImportPipeline {
    /// Pipeline with the built-in mapper, validator and row processors
    pub fn new(storage: StorageLayer, settings: ImportSettings) -> Self {
        Self::with_components(
            storage,
            settings,
            Arc::new(ColumnFieldMapper::new()),
            Arc::new(RuleValidationEngine::new()),
            ProcessorRegistry::with_defaults(),
        )
    }

    pub fn with_components(
        storage: StorageLayer,
        settings: ImportSettings,
        mapper: Arc<dyn FieldMapper>,
        validator: Arc<dyn ValidationEngine>,
        processors: ProcessorRegistry,
    ) -> Self {
        let aggregator = Arc::new(ProgressAggregator::new(
            storage.cache.clone(),
            storage.jobs.clone(),
            &settings,
        ));
        let cancellation = CancellationController::new(
            storage.cache.clone(),
            storage.jobs.clone(),
            settings.cancellation_ttl(),
        );
        let worker = Arc::new(BatchWorker::new(
            storage.jobs.clone(),
            storage.records.clone(),
            cancellation.clone(),
            aggregator.clone(),
            mapper.clone(),
            validator,
            processors,
            settings.preview_length,
        ));
        let queue = Arc::new(LocalWorkQueue::new(
            worker,
            settings.worker_concurrency,
            RetryPolicy::from_settings(&settings),
        ));
        let scheduler = BatchScheduler::new(
            storage.jobs.clone(),
            aggregator.clone(),
            queue.clone(),
            &settings,
        );
        let rollback = RollbackEngine::new(storage.jobs.clone(), storage.records.clone());

        Self {
            settings,
            storage,
            mapper,
            aggregator,
            cancellation,
            scheduler,
            rollback,
            queue,
        }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    pub fn storage(&self) -> &StorageLayer {
        &self.storage
    }

    /// Persist a new pending job
    pub async fn create_job(
        &self,
        ctx: &TenantContext,
        import_type: ImportType,
        field_mapping: FieldMapping,
        expected_rows: u64,
    ) -> Result<ImportJob> {
        let job = ImportJob::new(ctx.tenant_id.clone(), import_type, field_mapping, expected_rows);
        self.storage.jobs.create(&job).await?;
        info!(
            tenant = %ctx.tenant_id,
            job_id = %job.id,
            import_type = %import_type,
            expected_rows,
            "Import job created"
        );
        Ok(job)
    }

    /// Schedule already-parsed rows with the configured batch size
    pub async fn start(
        &self,
        ctx: &TenantContext,
        job_id: Uuid,
        rows: Vec<RawRow>,
    ) -> Result<BatchConfig> {
        self.start_with_batch_size(ctx, job_id, rows, self.settings.batch_size)
            .await
    }

    pub async fn start_with_batch_size(
        &self,
        ctx: &TenantContext,
        job_id: Uuid,
        rows: Vec<RawRow>,
        batch_size: usize,
    ) -> Result<BatchConfig> {
        self.scheduler.schedule(ctx, job_id, rows, batch_size).await
    }

    /// Create and schedule a job from a parser. Without an explicit mapping
    /// one is detected from the headers and a sample of rows.
    pub async fn import_file(
        &self,
        ctx: &TenantContext,
        import_type: ImportType,
        parser: &dyn FileParser,
        mapping: Option<FieldMapping>,
        options: &ParseOptions,
    ) -> Result<ImportJob> {
        let mapping = match mapping {
            Some(mapping) => mapping,
            None => self.detect_mapping(parser, import_type).await?,
        };

        let rows = parser.parse(options).await?;
        let job = self
            .create_job(ctx, import_type, mapping, rows.len() as u64)
            .await?;
        self.start(ctx, job.id, rows).await?;
        self.require_job(ctx, job.id).await
    }

    async fn detect_mapping(
        &self,
        parser: &dyn FileParser,
        import_type: ImportType,
    ) -> Result<FieldMapping> {
        let headers = parser.headers().await?;
        let sample = parser.sample_rows(DETECTION_SAMPLE_ROWS, 0).await?;
        let mapping = self.mapper.detect_mappings(&headers, &sample, import_type);
        if mapping.is_empty() {
            return Err(ImportError::bad_request(format!(
                "No columns could be mapped to {} fields",
                import_type
            )));
        }

        let confidence = self.mapper.confidence(&mapping, import_type);
        if confidence < LOW_CONFIDENCE {
            warn!(
                import_type = %import_type,
                confidence,
                "Detected field mapping has low confidence"
            );
        }
        Ok(mapping)
    }

    async fn require_job(&self, ctx: &TenantContext, job_id: Uuid) -> Result<ImportJob> {
        self.storage
            .jobs
            .get(&ctx.tenant_id, job_id)
            .await?
            .ok_or_else(|| ImportError::job_not_found(job_id.to_string()))
    }

    /// Status read model; active jobs show live cache counters
    pub async fn status(&self, ctx: &TenantContext, job_id: Uuid) -> Result<JobStatusView> {
        let job = self.require_job(ctx, job_id).await?;
        let view = JobStatusView::from_job(&job);
        if job.status.is_terminal() {
            return Ok(view);
        }
        let summary = self.aggregator.summary(ctx, job_id).await?;
        Ok(view.with_live_summary(&summary))
    }

    pub async fn list(&self, ctx: &TenantContext) -> Result<Vec<JobStatusView>> {
        Ok(self
            .storage
            .jobs
            .list(&ctx.tenant_id)
            .await?
            .iter()
            .map(JobStatusView::from_job)
            .collect())
    }

    /// Cached result of one batch, `None` before it completes or after the
    /// job was finalized
    pub async fn batch_result(
        &self,
        ctx: &TenantContext,
        job_id: Uuid,
        batch_number: usize,
    ) -> Result<Option<BatchResult>> {
        self.require_job(ctx, job_id).await?;
        self.aggregator.batch_result(ctx, job_id, batch_number).await
    }

    pub async fn cancel(&self, ctx: &TenantContext, job_id: Uuid) -> Result<JobStatusView> {
        let job = self.cancellation.request_cancellation(ctx, job_id).await?;
        Ok(JobStatusView::from_job(&job))
    }

    pub async fn rollback(&self, ctx: &TenantContext, job_id: Uuid) -> Result<RollbackReport> {
        self.rollback.rollback(ctx, job_id).await
    }

    /// Wait until every dispatched batch has finished
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.queue.dead_letters()
    }
}
