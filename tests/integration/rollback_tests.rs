//! Rollback restores the pre-import entity set

#[cfg(test)]
mod tests {
    use crate::common::fixtures::menu_rows_priced;
    use crate::common::{PipelineHarness, menu_mapping, menu_rows, settings};
    use tabular_import::core::import::{EntityRecord, ImportStatus, ImportType};
    use tabular_import::storage::records::RecordStore;
    use tabular_import::utils::error::ImportError;
    use uuid::Uuid;

    async fn snapshot(h: &PipelineHarness) -> Vec<EntityRecord> {
        h.records
            .list("acme", ImportType::Menu.entity_type())
            .await
            .unwrap()
    }

    async fn run_import(h: &PipelineHarness, rows: usize, price: &str) -> Uuid {
        let job = h
            .pipeline
            .create_job(&h.ctx, ImportType::Menu, menu_mapping(), rows as u64)
            .await
            .unwrap();
        h.pipeline
            .start(&h.ctx, job.id, menu_rows_priced(rows, price))
            .await
            .unwrap();
        h.pipeline.wait_idle().await;
        job.id
    }

    #[tokio::test]
    async fn test_rollback_restores_prior_entities() {
        let h = PipelineHarness::new(settings(30));

        // 50 pre-existing items, then an import touching 50 of them and adding 50
        run_import(&h, 50, "5.00").await;
        let before = snapshot(&h).await;
        assert_eq!(before.len(), 50);

        let job_id = run_import(&h, 100, "7.25").await;
        let during = snapshot(&h).await;
        assert_eq!(during.len(), 100);
        assert_ne!(during, before);

        let report = h.pipeline.rollback(&h.ctx, job_id).await.unwrap();
        assert!(report.success);
        assert_eq!(report.applied, 100);
        assert_eq!(report.failed, 0);
        assert_eq!(report.status, ImportStatus::RolledBack);

        assert_eq!(snapshot(&h).await, before);

        let status = h.pipeline.status(&h.ctx, job_id).await.unwrap();
        assert_eq!(status.status, ImportStatus::RolledBack);
    }

    #[tokio::test]
    async fn test_second_rollback_is_a_no_op() {
        let h = PipelineHarness::new(settings(100));
        let job_id = run_import(&h, 20, "9.50").await;

        let first = h.pipeline.rollback(&h.ctx, job_id).await.unwrap();
        assert_eq!(first.applied, 20);
        assert!(h.records.is_empty());

        let second = h.pipeline.rollback(&h.ctx, job_id).await.unwrap();
        assert!(second.success);
        assert_eq!(second.applied, 0);
        assert_eq!(second.status, ImportStatus::RolledBack);
    }

    #[tokio::test]
    async fn test_entities_already_removed_are_skipped() {
        let h = PipelineHarness::new(settings(100));
        let job_id = run_import(&h, 5, "9.50").await;

        let victim = snapshot(&h).await.remove(0);
        assert!(
            h.records
                .delete("acme", &victim.entity_type, &victim.id)
                .await
                .unwrap()
        );

        let report = h.pipeline.rollback(&h.ctx, job_id).await.unwrap();
        assert!(report.success);
        assert_eq!(report.applied, 4);
        assert_eq!(report.skipped, 1);
        assert!(h.records.is_empty());
    }

    #[tokio::test]
    async fn test_active_job_cannot_be_rolled_back() {
        let h = PipelineHarness::new(settings(100));
        let job = h
            .pipeline
            .create_job(&h.ctx, ImportType::Menu, menu_mapping(), 10)
            .await
            .unwrap();

        let err = h.pipeline.rollback(&h.ctx, job.id).await.unwrap_err();
        assert!(matches!(err, ImportError::InvalidState(_)));

        // A cancelled job with no committed work rolls back trivially
        h.pipeline.cancel(&h.ctx, job.id).await.unwrap();
        let report = h.pipeline.rollback(&h.ctx, job.id).await.unwrap();
        assert!(report.success);
        assert_eq!(report.applied, 0);
        assert_eq!(report.status, ImportStatus::RolledBack);
    }

    #[tokio::test]
    async fn test_rollback_of_job_with_row_errors() {
        let h = PipelineHarness::new(settings(100));
        let mut rows = menu_rows(10);
        rows[3].insert("Price".to_string(), serde_json::json!("-4"));

        let job = h
            .pipeline
            .create_job(&h.ctx, ImportType::Menu, menu_mapping(), 10)
            .await
            .unwrap();
        h.pipeline.start(&h.ctx, job.id, rows).await.unwrap();
        h.pipeline.wait_idle().await;
        assert_eq!(h.records.len(), 9);

        let report = h.pipeline.rollback(&h.ctx, job.id).await.unwrap();
        assert_eq!(report.applied, 9);
        assert!(h.records.is_empty());
    }
}
