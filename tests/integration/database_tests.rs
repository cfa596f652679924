//! SeaORM stores on in-memory SQLite

#[cfg(test)]
mod tests {
    use crate::common::{TestDatabase, menu_mapping, menu_rows, settings};
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;
    use tabular_import::core::import::{
        EntityRecord, ImportJob, ImportPipeline, ImportStatus, ImportType, RollbackDelta,
        TenantContext,
    };
    use tabular_import::core::import::job::{JobFinalization, JobProgress};
    use tabular_import::storage::StorageLayer;
    use tabular_import::storage::cache::MemoryCache;
    use tabular_import::storage::jobs::JobStore;
    use tabular_import::storage::records::RecordStore;
    use tabular_import::utils::error::ImportError;

    fn record(id: &str, key: &str, price: f64) -> EntityRecord {
        EntityRecord {
            id: id.to_string(),
            entity_type: "menu_item".to_string(),
            natural_key: key.to_string(),
            fields: json!({"name": key, "price": price}),
        }
    }

    #[tokio::test]
    async fn test_database_health_check() {
        let db = TestDatabase::new().await.db();
        let health = db.health_check().await;
        assert!(health.is_ok(), "Health check failed: {:?}", health.err());
    }

    #[tokio::test]
    async fn test_job_round_trip() {
        let db = TestDatabase::new().await.db();
        let job = ImportJob::new("acme", ImportType::Menu, menu_mapping(), 250);
        db.create(&job).await.unwrap();

        let loaded = JobStore::get(db.as_ref(), "acme", job.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.status, ImportStatus::Pending);
        assert_eq!(loaded.field_mapping, menu_mapping());
        assert_eq!(loaded.total_records, 250);

        assert!(JobStore::get(db.as_ref(), "globex", job.id).await.unwrap().is_none());
        assert_eq!(JobStore::list(db.as_ref(), "acme").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_conditional_job_updates() {
        let db = TestDatabase::new().await.db();
        let job = ImportJob::new("acme", ImportType::Menu, menu_mapping(), 100);
        db.create(&job).await.unwrap();

        assert!(db.mark_processing("acme", job.id, Utc::now()).await.unwrap());
        assert!(!db.mark_processing("acme", job.id, Utc::now()).await.unwrap());

        let progress = |processed| JobProgress {
            processed,
            successful: processed,
            failed: 0,
            percentage: processed as u8,
        };
        assert!(db.update_progress("acme", job.id, &progress(50)).await.unwrap());
        // Stale writers never move progress backwards
        assert!(!db.update_progress("acme", job.id, &progress(20)).await.unwrap());

        let finalization = JobFinalization {
            status: ImportStatus::Completed,
            processed: 100,
            successful: 100,
            failed: 0,
            progress_percentage: 100,
            errors: Vec::new(),
            completed_at: Utc::now(),
            processing_time_seconds: 1.5,
        };
        assert!(db.finalize("acme", job.id, &finalization).await.unwrap());
        assert!(!db.finalize("acme", job.id, &finalization).await.unwrap());
        assert!(!db.update_progress("acme", job.id, &progress(100)).await.unwrap());

        let loaded = JobStore::get(db.as_ref(), "acme", job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ImportStatus::Completed);
        assert_eq!(loaded.processed_records, 100);
        assert_eq!(loaded.processing_time_seconds, Some(1.5));

        let err = db
            .transition("acme", job.id, ImportStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::InvalidState(_)));
        let rolled_back = db
            .transition("acme", job.id, ImportStatus::RolledBack)
            .await
            .unwrap();
        assert_eq!(rolled_back.status, ImportStatus::RolledBack);
    }

    #[tokio::test]
    async fn test_rollback_deltas_keep_insertion_order() {
        let db = TestDatabase::new().await.db();
        let job = ImportJob::new("acme", ImportType::Menu, menu_mapping(), 3);
        db.create(&job).await.unwrap();

        let first = record("a", "ext:a", 1.0);
        let deltas = vec![
            RollbackDelta::created(&first, 0),
            RollbackDelta::updated(record("b", "ext:b", 2.0), 0),
        ];
        db.append_rollback_deltas("acme", job.id, &deltas).await.unwrap();
        let late = [RollbackDelta::created(&record("c", "ext:c", 3.0), 1)];
        db.append_rollback_deltas("acme", job.id, &late).await.unwrap();

        let stored = db.rollback_deltas("acme", job.id).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[..2], deltas[..]);
        assert_eq!(stored[2].entity_id, "c");
    }

    #[tokio::test]
    async fn test_record_transaction_commit_and_discard() {
        let db = TestDatabase::new().await.db();

        let mut tx = db.begin("acme").await.unwrap();
        tx.insert(&record("a", "ext:a", 1.0)).await.unwrap();
        assert!(tx.find_by_key("menu_item", "ext:a").await.unwrap().is_some());
        tx.commit().await.unwrap();

        // Dropped without commit
        {
            let mut tx = db.begin("acme").await.unwrap();
            tx.insert(&record("b", "ext:b", 2.0)).await.unwrap();
        }

        let stored = RecordStore::list(db.as_ref(), "acme", "menu_item").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "a");
        assert!(RecordStore::list(db.as_ref(), "globex", "menu_item").await.unwrap().is_empty());

        assert!(db.delete("acme", "menu_item", "a").await.unwrap());
        assert!(!db.delete("acme", "menu_item", "a").await.unwrap());

        db.restore("acme", &record("a", "ext:a", 1.0)).await.unwrap();
        let restored = RecordStore::get(db.as_ref(), "acme", "menu_item", "a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(restored.fields["price"], json!(1.0));
    }

    #[tokio::test]
    async fn test_pipeline_on_sqlite() {
        let db = TestDatabase::new().await.db();
        let storage =
            StorageLayer::with_backends(Arc::new(MemoryCache::new()), db.clone(), db.clone());
        let mut settings = settings(10);
        settings.worker_concurrency = 1;
        let pipeline = ImportPipeline::new(storage, settings);
        let ctx = TenantContext::new("acme");

        let mut rows = menu_rows(25);
        rows[7].insert("Price".to_string(), json!("free"));
        let job = pipeline
            .create_job(&ctx, ImportType::Menu, menu_mapping(), 25)
            .await
            .unwrap();
        pipeline.start(&ctx, job.id, rows).await.unwrap();
        pipeline.wait_idle().await;

        let status = pipeline.status(&ctx, job.id).await.unwrap();
        assert_eq!(status.status, ImportStatus::CompletedWithErrors);
        assert_eq!(status.successful_imports, 24);
        assert_eq!(status.errors[0].row, 7);
        assert_eq!(RecordStore::list(db.as_ref(), "acme", "menu_item").await.unwrap().len(), 24);

        let report = pipeline.rollback(&ctx, job.id).await.unwrap();
        assert!(report.success);
        assert_eq!(report.applied, 24);
        assert!(RecordStore::list(db.as_ref(), "acme", "menu_item").await.unwrap().is_empty());
    }
}
