//! End-to-end pipeline scenarios over in-memory stores

#[cfg(test)]
mod tests {
    use crate::common::{PipelineHarness, menu_mapping, menu_rows, settings};
    use serde_json::json;
    use tabular_import::core::import::{DeltaAction, ImportStatus, ImportType, TenantContext};
    use tabular_import::storage::jobs::JobStore;
    use tabular_import::storage::records::RecordStore;
    use tabular_import::utils::error::ImportError;

    #[tokio::test]
    async fn test_import_runs_in_three_batches() {
        let h = PipelineHarness::new(settings(100));
        let job = h
            .pipeline
            .create_job(&h.ctx, ImportType::Menu, menu_mapping(), 250)
            .await
            .unwrap();

        let config = h.pipeline.start(&h.ctx, job.id, menu_rows(250)).await.unwrap();
        assert_eq!(config.total_batches, 3);
        h.pipeline.wait_idle().await;

        let status = h.pipeline.status(&h.ctx, job.id).await.unwrap();
        assert_eq!(status.status, ImportStatus::Completed);
        assert_eq!(status.progress_percentage, 100);
        assert_eq!(status.processed_records, 250);
        assert_eq!(status.successful_imports, 250);
        assert_eq!(status.failed_imports, 0);
        assert!(status.errors.is_empty());
        assert!(status.completed_at.is_some());
        assert!(status.processing_time_seconds.is_some());

        assert_eq!(h.records.len(), 250);
        assert!(h.pipeline.dead_letters().is_empty());
        // Transient coordination state is gone; nothing else was ever stored
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_failing_batch_is_retried_and_counted_once() {
        let h = PipelineHarness::new(settings(100));
        let job = h
            .pipeline
            .create_job(&h.ctx, ImportType::Menu, menu_mapping(), 250)
            .await
            .unwrap();

        // Batch 1 (rows 100..200) fails its first two commits
        h.records.fail_commits_for_key("ext:sku-150", 2);
        h.pipeline.start(&h.ctx, job.id, menu_rows(250)).await.unwrap();
        h.pipeline.wait_idle().await;

        let status = h.pipeline.status(&h.ctx, job.id).await.unwrap();
        assert_eq!(status.status, ImportStatus::Completed);
        assert_eq!(status.processed_records, 250);
        assert_eq!(status.successful_imports, 250);
        assert!(h.pipeline.dead_letters().is_empty());
        assert_eq!(h.records.len(), 250);

        // Each row was written once
        let deltas = h.jobs.rollback_deltas("acme", job.id).await.unwrap();
        assert_eq!(deltas.len(), 250);
        assert!(deltas.iter().all(|d| d.action == DeltaAction::Create));
    }

    #[tokio::test]
    async fn test_invalid_row_is_recorded_with_redacted_snapshot() {
        let h = PipelineHarness::new(settings(100));
        let mut rows = menu_rows(250);
        for row in rows.iter_mut() {
            row.insert("api_token".to_string(), json!("tok_live_123"));
        }
        rows[42].insert("Price".to_string(), json!("abc"));

        let job = h
            .pipeline
            .create_job(&h.ctx, ImportType::Menu, menu_mapping(), 250)
            .await
            .unwrap();
        h.pipeline.start(&h.ctx, job.id, rows).await.unwrap();
        h.pipeline.wait_idle().await;

        let status = h.pipeline.status(&h.ctx, job.id).await.unwrap();
        assert_eq!(status.status, ImportStatus::CompletedWithErrors);
        assert_eq!(status.successful_imports, 249);
        assert_eq!(status.failed_imports, 1);
        assert_eq!(status.progress_percentage, 100);

        assert_eq!(status.errors.len(), 1);
        let error = &status.errors[0];
        assert_eq!(error.row, 42);
        assert!(error.message.contains("not a number"));
        assert_eq!(error.data["api_token"], json!("[REDACTED]"));
        assert_eq!(error.data["Item Name"], json!("Item 42"));
    }

    #[tokio::test]
    async fn test_rerun_updates_instead_of_duplicating() {
        let h = PipelineHarness::new(settings(100));

        for expected_action in [DeltaAction::Create, DeltaAction::Update] {
            let job = h
                .pipeline
                .create_job(&h.ctx, ImportType::Menu, menu_mapping(), 250)
                .await
                .unwrap();
            h.pipeline.start(&h.ctx, job.id, menu_rows(250)).await.unwrap();
            h.pipeline.wait_idle().await;

            let status = h.pipeline.status(&h.ctx, job.id).await.unwrap();
            assert_eq!(status.status, ImportStatus::Completed);
            assert_eq!(h.records.len(), 250);

            let deltas = h.jobs.rollback_deltas("acme", job.id).await.unwrap();
            assert!(deltas.iter().all(|d| d.action == expected_action));
        }
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let h = PipelineHarness::new(settings(100));
        let job = h
            .pipeline
            .create_job(&h.ctx, ImportType::Menu, menu_mapping(), 250)
            .await
            .unwrap();

        let cancelled = h.pipeline.cancel(&h.ctx, job.id).await.unwrap();
        assert_eq!(cancelled.status, ImportStatus::Cancelled);

        let err = h
            .pipeline
            .start(&h.ctx, job.id, menu_rows(250))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::InvalidState(_)));
        h.pipeline.wait_idle().await;

        let status = h.pipeline.status(&h.ctx, job.id).await.unwrap();
        assert_eq!(status.status, ImportStatus::Cancelled);
        assert_eq!(status.processed_records, 0);
        assert!(h.records.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_after_scheduling_skips_remaining_batches() {
        let h = PipelineHarness::new(settings(10));
        let job = h
            .pipeline
            .create_job(&h.ctx, ImportType::Menu, menu_mapping(), 100)
            .await
            .unwrap();

        // Batches are spawned but have not run yet on this single-threaded runtime
        h.pipeline.start(&h.ctx, job.id, menu_rows(100)).await.unwrap();
        h.pipeline.cancel(&h.ctx, job.id).await.unwrap();
        h.pipeline.wait_idle().await;

        let status = h.pipeline.status(&h.ctx, job.id).await.unwrap();
        assert_eq!(status.status, ImportStatus::Cancelled);
        assert!(h.records.is_empty());

        // Cancelling again is rejected
        let err = h.pipeline.cancel(&h.ctx, job.id).await.unwrap_err();
        assert!(matches!(err, ImportError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_jobs_are_isolated_by_tenant() {
        let h = PipelineHarness::new(settings(100));
        let job = h
            .pipeline
            .create_job(&h.ctx, ImportType::Menu, menu_mapping(), 10)
            .await
            .unwrap();
        h.pipeline.start(&h.ctx, job.id, menu_rows(10)).await.unwrap();
        h.pipeline.wait_idle().await;

        let other = TenantContext::new("globex");
        let err = h.pipeline.status(&other, job.id).await.unwrap_err();
        assert!(matches!(err, ImportError::JobNotFound(_)));
        assert!(h.pipeline.cancel(&other, job.id).await.is_err());
        assert!(h.pipeline.rollback(&other, job.id).await.is_err());
        assert!(h.pipeline.list(&other).await.unwrap().is_empty());

        assert!(
            h.records
                .list("globex", ImportType::Menu.entity_type())
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            h.records
                .list("acme", ImportType::Menu.entity_type())
                .await
                .unwrap()
                .len(),
            10
        );
    }

    #[tokio::test]
    async fn test_category_import() {
        let h = PipelineHarness::new(settings(2));
        let rows: Vec<_> = [
            json!({"Category": "Mains", "Position": "1"}),
            json!({"Category": "Sides", "Position": "2", "Parent": "Mains"}),
            json!({"Category": "Drinks", "Position": "1.5"}),
        ]
        .into_iter()
        .map(|row| row.as_object().cloned().unwrap())
        .collect();

        let parser = tabular_import::core::import::PreparsedRows::new(rows);
        let job = h
            .pipeline
            .import_file(
                &h.ctx,
                ImportType::Category,
                &parser,
                None,
                &Default::default(),
            )
            .await
            .unwrap();
        h.pipeline.wait_idle().await;

        let status = h.pipeline.status(&h.ctx, job.id).await.unwrap();
        assert_eq!(status.status, ImportStatus::CompletedWithErrors);
        assert_eq!(status.successful_imports, 2);
        assert_eq!(status.errors[0].row, 2);
        assert!(status.errors[0].message.contains("sort_order"));
    }
}
