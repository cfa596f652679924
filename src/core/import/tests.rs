//! Worker and queue behaviour over in-memory storage

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use super::capabilities::{MockValidationEngine, RowValidation};
use super::*;
use crate::config::ImportSettings;
use crate::storage::StorageLayer;
use crate::storage::cache::{MemoryCache, SharedCache};
use crate::storage::jobs::{JobStore, MemoryJobStore};
use crate::storage::records::{MemoryRecordStore, RecordTransaction};
use crate::utils::error::{ImportError, Result};

struct Harness {
    cache: Arc<MemoryCache>,
    jobs: Arc<MemoryJobStore>,
    records: Arc<MemoryRecordStore>,
    settings: ImportSettings,
}

impl Harness {
    fn new() -> Self {
        Self {
            cache: Arc::new(MemoryCache::new()),
            jobs: Arc::new(MemoryJobStore::new()),
            records: Arc::new(MemoryRecordStore::new()),
            settings: ImportSettings {
                batch_size: 10,
                retry_backoff_ms: 1,
                ..ImportSettings::default()
            },
        }
    }

    fn storage(&self) -> StorageLayer {
        StorageLayer::with_backends(self.cache.clone(), self.jobs.clone(), self.records.clone())
    }

    fn pipeline(&self) -> ImportPipeline {
        ImportPipeline::new(self.storage(), self.settings.clone())
    }

    fn aggregator(&self) -> ProgressAggregator {
        ProgressAggregator::new(self.cache.clone(), self.jobs.clone(), &self.settings)
    }

    fn cancellation(&self) -> CancellationController {
        CancellationController::new(self.cache.clone(), self.jobs.clone(), Duration::from_secs(60))
    }

    fn worker(&self, validator: Arc<dyn ValidationEngine>) -> BatchWorker {
        self.worker_with(validator, ProcessorRegistry::with_defaults())
    }

    fn worker_with(
        &self,
        validator: Arc<dyn ValidationEngine>,
        processors: ProcessorRegistry,
    ) -> BatchWorker {
        let aggregator = Arc::new(self.aggregator());
        BatchWorker::new(
            self.jobs.clone(),
            self.records.clone(),
            self.cancellation(),
            aggregator,
            Arc::new(ColumnFieldMapper::new()),
            validator,
            processors,
            self.settings.preview_length,
        )
    }

    /// Pipeline whose shared cache is `cache` instead of the harness cache
    fn pipeline_over(&self, cache: Arc<dyn SharedCache>) -> ImportPipeline {
        let storage = StorageLayer::with_backends(cache, self.jobs.clone(), self.records.clone());
        ImportPipeline::new(storage, self.settings.clone())
    }
}

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Hook = Arc<dyn Fn() -> HookFuture + Send + Sync>;

fn hook<F, Fut>(f: F) -> Hook
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || Box::pin(f()) as HookFuture)
}

/// Menu processor that runs `hook` once row `after_row` of the batch is written
struct HookedProcessor {
    after_row: usize,
    seen: AtomicUsize,
    hook: Hook,
}

#[async_trait]
impl RowProcessor for HookedProcessor {
    fn import_type(&self) -> ImportType {
        ImportType::Menu
    }

    async fn process(
        &self,
        row: &ProjectedRow,
        tx: &mut dyn RecordTransaction,
        batch_number: usize,
    ) -> Result<RollbackDelta> {
        let delta = MenuItemProcessor.process(row, tx, batch_number).await?;
        if self.seen.fetch_add(1, Ordering::SeqCst) == self.after_row {
            (self.hook)().await;
        }
        Ok(delta)
    }
}

fn hooked(after_row: usize, hook: Hook) -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(HookedProcessor {
        after_row,
        seen: AtomicUsize::new(0),
        hook,
    }));
    registry
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountFault {
    /// The counting call fails without reaching the cache
    Lost,
    /// The counters are applied but the caller sees an error
    AppliedThenLost,
}

/// Memory cache whose batch counting fails a fixed number of times
#[derive(Debug)]
struct FlakyCache {
    inner: MemoryCache,
    fault: CountFault,
    failures: AtomicU32,
}

impl FlakyCache {
    fn new(fault: CountFault, failures: u32) -> Self {
        Self {
            inner: MemoryCache::new(),
            fault,
            failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl SharedCache for FlakyCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.inner.delete(keys).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn hash_increment(
        &self,
        key: &str,
        field: &str,
        delta: i64,
        ttl: Duration,
    ) -> Result<i64> {
        self.inner.hash_increment(key, field, delta, ttl).await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str, ttl: Duration) -> Result<()> {
        self.inner.hash_set(key, field, value, ttl).await
    }

    async fn hash_increment_once(
        &self,
        key: &str,
        marker: &str,
        increments: &[(&str, i64)],
        fields: &[(&str, &str)],
        ttl: Duration,
    ) -> Result<Option<Vec<i64>>> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !failing {
            return self
                .inner
                .hash_increment_once(key, marker, increments, fields, ttl)
                .await;
        }
        if self.fault == CountFault::AppliedThenLost {
            self.inner
                .hash_increment_once(key, marker, increments, fields, ttl)
                .await?;
        }
        Err(ImportError::cache("connection reset by peer"))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        self.inner.hash_get_all(key).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool> {
        self.inner.compare_and_swap(key, expected, new, ttl).await
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }
}

fn mapping() -> FieldMapping {
    FieldMapping::new()
        .map("Name", "name")
        .map_with("Price", "price", FieldTransform::Number)
        .map("SKU", "external_id")
        .map("Category", "category")
}

fn menu_rows(count: usize) -> Vec<RawRow> {
    (0..count)
        .map(|i| {
            json!({
                "Name": format!("Item {}", i),
                "Price": "9.50",
                "SKU": format!("sku-{}", i),
                "Category": "Mains",
            })
            .as_object()
            .cloned()
            .unwrap()
        })
        .collect()
}

async fn pending_job(harness: &Harness, rows: usize) -> ImportJob {
    let job = ImportJob::new("acme", ImportType::Menu, mapping(), rows as u64);
    harness.jobs.create(&job).await.unwrap();
    job
}

fn unit(job: &ImportJob, batch_number: usize, rows: Vec<RawRow>) -> BatchUnit {
    BatchUnit {
        ctx: TenantContext::new("acme"),
        job_id: job.id,
        batch_number,
        offset: batch_number * 10,
        rows,
        attempt: 1,
        max_attempts: 3,
        time_budget: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_validation_failures_become_row_errors() {
    let harness = Harness::new();
    let job = pending_job(&harness, 3).await;

    let mut validator = MockValidationEngine::new();
    validator
        .expect_validate_row()
        .times(3)
        .returning(|_, row_number, _, _| {
            if row_number == 1 {
                RowValidation::from_findings(vec!["price is suspicious".to_string()], vec![])
            } else {
                RowValidation::from_findings(vec![], vec!["looks fine".to_string()])
            }
        });
    let worker = harness.worker(Arc::new(validator));
    harness
        .aggregator()
        .store_batch_config(
            &TenantContext::new("acme"),
            job.id,
            &BatchConfig {
                total_batches: 1,
                total_rows: 3,
                batch_size: 10,
            },
        )
        .await
        .unwrap();

    let mut rows = menu_rows(3);
    rows[1].insert("password".to_string(), json!("hunter2"));
    let outcome = worker.process_batch(&unit(&job, 0, rows)).await.unwrap();

    let BatchOutcome::Completed(result) = outcome else {
        panic!("batch should complete");
    };
    assert_eq!(result.processed, 3);
    assert_eq!(result.successful, 2);
    assert_eq!(result.failed, 1);
    assert_eq!(result.errors[0].row, 1);
    assert!(result.errors[0].message.contains("price is suspicious"));
    assert_eq!(result.errors[0].data["password"], json!("[REDACTED]"));
    assert_eq!(result.warnings.len(), 2);
    assert_eq!(harness.records.len(), 2);

    // Only batch of the job, so it finalized
    let job = harness.jobs.get("acme", job.id).await.unwrap().unwrap();
    assert_eq!(job.status, ImportStatus::CompletedWithErrors);
    assert_eq!(job.failed_imports, 1);
}

#[tokio::test]
async fn test_cancelled_job_skips_batch() {
    let harness = Harness::new();
    let job = pending_job(&harness, 10).await;
    harness
        .jobs
        .transition("acme", job.id, ImportStatus::Cancelled)
        .await
        .unwrap();

    let worker = harness.worker(Arc::new(RuleValidationEngine::new()));
    let outcome = worker.process_batch(&unit(&job, 0, menu_rows(10))).await.unwrap();

    assert_eq!(
        outcome,
        BatchOutcome::Skipped(SkipReason::JobTerminal(ImportStatus::Cancelled))
    );
    assert!(harness.records.is_empty());
}

#[tokio::test]
async fn test_cancellation_flag_skips_batch() {
    let harness = Harness::new();
    let job = pending_job(&harness, 10).await;
    let keys = keys::CacheKeys::new(&TenantContext::new("acme"), job.id);
    harness
        .cache
        .set(&keys.import_cancelled(), "1", Duration::from_secs(60))
        .await
        .unwrap();

    let worker = harness.worker(Arc::new(RuleValidationEngine::new()));
    let outcome = worker.process_batch(&unit(&job, 0, menu_rows(10))).await.unwrap();

    assert_eq!(outcome, BatchOutcome::Skipped(SkipReason::Cancelled));
    let job = harness.jobs.get("acme", job.id).await.unwrap().unwrap();
    assert_eq!(job.status, ImportStatus::Pending);
}

#[tokio::test]
async fn test_commit_failure_discards_batch_and_is_retryable() {
    let harness = Harness::new();
    let job = pending_job(&harness, 10).await;
    harness.records.fail_commits_for_key("ext:sku-3", 1);

    let worker = harness.worker(Arc::new(RuleValidationEngine::new()));
    let err = worker
        .process_batch(&unit(&job, 0, menu_rows(10)))
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(harness.records.is_empty());
    assert!(
        harness
            .aggregator()
            .batch_result(&TenantContext::new("acme"), job.id, 0)
            .await
            .unwrap()
            .is_none()
    );

    // The next attempt goes through
    let outcome = worker.process_batch(&unit(&job, 0, menu_rows(10))).await.unwrap();
    assert!(matches!(outcome, BatchOutcome::Completed(ref r) if r.successful == 10));
    assert_eq!(harness.records.len(), 10);
}

#[tokio::test]
async fn test_missing_job_is_job_level() {
    let harness = Harness::new();
    let job = ImportJob::new("acme", ImportType::Menu, mapping(), 10);

    let worker = harness.worker(Arc::new(RuleValidationEngine::new()));
    let err = worker
        .process_batch(&unit(&job, 0, menu_rows(10)))
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::JobNotFound(_)));
    assert!(err.is_job_level());
}

#[tokio::test]
async fn test_exhausted_batch_is_dead_lettered_and_counted_failed() {
    let mut harness = Harness::new();
    harness.settings.max_attempts = 2;
    let pipeline = harness.pipeline();
    let ctx = TenantContext::new("acme");

    let job = pipeline
        .create_job(&ctx, ImportType::Menu, mapping(), 20)
        .await
        .unwrap();
    harness.records.fail_commits_for_key("ext:sku-15", 5);
    pipeline.start(&ctx, job.id, menu_rows(20)).await.unwrap();
    pipeline.wait_idle().await;

    let dead = pipeline.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].batch_number, 1);
    assert_eq!(dead[0].attempts, 2);

    let status = pipeline.status(&ctx, job.id).await.unwrap();
    assert_eq!(status.status, ImportStatus::CompletedWithErrors);
    assert_eq!(status.successful_imports, 10);
    assert_eq!(status.failed_imports, 10);
    assert_eq!(status.progress_percentage, 100);
    assert!(status.errors.iter().all(|e| e.row >= 10));
}

#[tokio::test]
async fn test_missing_processor_fails_job() {
    let harness = Harness::new();
    let pipeline = ImportPipeline::with_components(
        harness.storage(),
        harness.settings.clone(),
        Arc::new(ColumnFieldMapper::new()),
        Arc::new(RuleValidationEngine::new()),
        ProcessorRegistry::new(),
    );
    let ctx = TenantContext::new("acme");

    let job = pipeline
        .create_job(&ctx, ImportType::Menu, mapping(), 5)
        .await
        .unwrap();
    pipeline.start(&ctx, job.id, menu_rows(5)).await.unwrap();
    pipeline.wait_idle().await;

    let status = pipeline.status(&ctx, job.id).await.unwrap();
    assert_eq!(status.status, ImportStatus::Failed);
    assert!(pipeline.dead_letters().is_empty());
    assert!(harness.records.is_empty());
}

#[tokio::test]
async fn test_zero_batch_size_fails_job() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    let ctx = TenantContext::new("acme");

    let job = pipeline
        .create_job(&ctx, ImportType::Menu, mapping(), 5)
        .await
        .unwrap();
    let err = pipeline
        .start_with_batch_size(&ctx, job.id, menu_rows(5), 0)
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::InvalidBatchConfig(_)));
    let status = pipeline.status(&ctx, job.id).await.unwrap();
    assert_eq!(status.status, ImportStatus::Failed);
}

#[tokio::test]
async fn test_empty_job_completes_immediately() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    let ctx = TenantContext::new("acme");

    let job = pipeline
        .create_job(&ctx, ImportType::Category, FieldMapping::new(), 0)
        .await
        .unwrap();
    let config = pipeline.start(&ctx, job.id, Vec::new()).await.unwrap();

    assert_eq!(config.total_batches, 0);
    let status = pipeline.status(&ctx, job.id).await.unwrap();
    assert_eq!(status.status, ImportStatus::Completed);
    assert_eq!(status.progress_percentage, 100);
}

#[tokio::test]
async fn test_rows_missing_for_expected_total_fail_job() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    let ctx = TenantContext::new("acme");

    let job = pipeline
        .create_job(&ctx, ImportType::Menu, mapping(), 50)
        .await
        .unwrap();
    let err = pipeline.start(&ctx, job.id, Vec::new()).await.unwrap_err();

    assert!(matches!(err, ImportError::InvalidBatchConfig(_)));
    assert_eq!(
        pipeline.status(&ctx, job.id).await.unwrap().status,
        ImportStatus::Failed
    );
}

#[tokio::test]
async fn test_import_file_detects_mapping() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    let ctx = TenantContext::new("acme");

    let parser = PreparsedRows::new(menu_rows(25));
    let job = pipeline
        .import_file(&ctx, ImportType::Menu, &parser, None, &ParseOptions::default())
        .await
        .unwrap();
    pipeline.wait_idle().await;

    assert_eq!(job.total_records, 25);
    assert!(job.field_mapping.targets("price"));
    let status = pipeline.status(&ctx, job.id).await.unwrap();
    assert_eq!(status.status, ImportStatus::Completed);
    assert_eq!(status.successful_imports, 25);
}

#[tokio::test]
async fn test_import_file_without_recognisable_columns() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    let ctx = TenantContext::new("acme");

    let rows = vec![json!({"foo": 1, "bar": 2}).as_object().cloned().unwrap()];
    let err = pipeline
        .import_file(
            &ctx,
            ImportType::Menu,
            &PreparsedRows::new(rows),
            None,
            &ParseOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::BadRequest(_)));
    assert!(pipeline.list(&ctx).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    let ctx = TenantContext::new("acme");

    let job = pipeline
        .create_job(&ctx, ImportType::Menu, mapping(), 5)
        .await
        .unwrap();
    pipeline.start(&ctx, job.id, menu_rows(5)).await.unwrap();
    pipeline.wait_idle().await;

    let err = pipeline.start(&ctx, job.id, menu_rows(5)).await.unwrap_err();
    assert!(matches!(err, ImportError::InvalidState(_)));
    assert_eq!(harness.records.len(), 5);
}

#[tokio::test]
async fn test_cancellation_mid_batch_commits_processed_rows() {
    let harness = Harness::new();
    let job = pending_job(&harness, 5).await;

    let controller = harness.cancellation();
    let ctx = TenantContext::new("acme");
    let job_id = job.id;
    let cancel = hook(move || {
        let controller = controller.clone();
        let ctx = ctx.clone();
        async move {
            controller.request_cancellation(&ctx, job_id).await.unwrap();
        }
    });

    let worker = harness.worker_with(Arc::new(RuleValidationEngine::new()), hooked(2, cancel));
    let outcome = worker.process_batch(&unit(&job, 0, menu_rows(5))).await.unwrap();

    let BatchOutcome::Completed(result) = outcome else {
        panic!("interrupted batch should still complete");
    };
    assert!(result.interrupted);
    assert_eq!(result.processed, 3);
    assert_eq!(result.successful, 3);
    assert_eq!(harness.records.len(), 3);
    assert_eq!(harness.jobs.rollback_deltas("acme", job.id).await.unwrap().len(), 3);

    let job = harness.jobs.get("acme", job.id).await.unwrap().unwrap();
    assert_eq!(job.status, ImportStatus::Cancelled);
}

#[tokio::test]
async fn test_rollback_during_batch_undoes_late_commit() {
    let harness = Harness::new();
    let job = pending_job(&harness, 5).await;

    let controller = harness.cancellation();
    let engine = RollbackEngine::new(harness.jobs.clone(), harness.records.clone());
    let ctx = TenantContext::new("acme");
    let job_id = job.id;
    let cancel_and_roll_back = hook(move || {
        let controller = controller.clone();
        let engine = engine.clone();
        let ctx = ctx.clone();
        async move {
            controller.request_cancellation(&ctx, job_id).await.unwrap();
            let report = engine.rollback(&ctx, job_id).await.unwrap();
            assert_eq!(report.status, ImportStatus::RolledBack);
        }
    });

    let worker = harness.worker_with(
        Arc::new(RuleValidationEngine::new()),
        hooked(2, cancel_and_roll_back),
    );
    let outcome = worker.process_batch(&unit(&job, 0, menu_rows(5))).await.unwrap();

    assert_eq!(
        outcome,
        BatchOutcome::Skipped(SkipReason::JobTerminal(ImportStatus::RolledBack))
    );
    assert!(harness.records.is_empty());
    let job = harness.jobs.get("acme", job.id).await.unwrap().unwrap();
    assert_eq!(job.status, ImportStatus::RolledBack);
}

#[tokio::test]
async fn test_failed_count_is_retried_to_completion() {
    for fault in [CountFault::Lost, CountFault::AppliedThenLost] {
        let harness = Harness::new();
        let pipeline = harness.pipeline_over(Arc::new(FlakyCache::new(fault, 1)));
        let ctx = TenantContext::new("acme");

        let job = pipeline
            .create_job(&ctx, ImportType::Menu, mapping(), 10)
            .await
            .unwrap();
        pipeline.start(&ctx, job.id, menu_rows(10)).await.unwrap();
        pipeline.wait_idle().await;

        let status = pipeline.status(&ctx, job.id).await.unwrap();
        assert_eq!(status.status, ImportStatus::Completed, "{:?}", fault);
        assert_eq!(status.processed_records, 10, "{:?}", fault);
        assert_eq!(status.successful_imports, 10, "{:?}", fault);
        assert!(pipeline.dead_letters().is_empty());
        assert_eq!(harness.records.len(), 10);
    }
}

#[tokio::test]
async fn test_counted_batch_without_retries_left_still_finalizes() {
    let mut harness = Harness::new();
    harness.settings.max_attempts = 1;
    let pipeline =
        harness.pipeline_over(Arc::new(FlakyCache::new(CountFault::AppliedThenLost, 1)));
    let ctx = TenantContext::new("acme");

    let job = pipeline
        .create_job(&ctx, ImportType::Menu, mapping(), 10)
        .await
        .unwrap();
    pipeline.start(&ctx, job.id, menu_rows(10)).await.unwrap();
    pipeline.wait_idle().await;

    // The committed attempt's result is what gets counted
    assert_eq!(pipeline.dead_letters().len(), 1);
    let status = pipeline.status(&ctx, job.id).await.unwrap();
    assert_eq!(status.status, ImportStatus::Completed);
    assert_eq!(status.successful_imports, 10);
    assert_eq!(status.failed_imports, 0);
}

#[tokio::test]
async fn test_uncountable_batch_fails_job() {
    let mut harness = Harness::new();
    harness.settings.max_attempts = 2;
    let pipeline = harness.pipeline_over(Arc::new(FlakyCache::new(CountFault::Lost, u32::MAX)));
    let ctx = TenantContext::new("acme");

    let job = pipeline
        .create_job(&ctx, ImportType::Menu, mapping(), 10)
        .await
        .unwrap();
    pipeline.start(&ctx, job.id, menu_rows(10)).await.unwrap();
    pipeline.wait_idle().await;

    assert_eq!(pipeline.dead_letters().len(), 1);
    let status = pipeline.status(&ctx, job.id).await.unwrap();
    assert_eq!(status.status, ImportStatus::Failed);
}
