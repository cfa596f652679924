use sea_orm_migration::prelude::*;

use super::m20240301_000001_create_import_jobs_table::ImportJobs;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ImportRollbackDeltas::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ImportRollbackDeltas::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ImportRollbackDeltas::JobId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ImportRollbackDeltas::TenantId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ImportRollbackDeltas::Action)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ImportRollbackDeltas::EntityType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ImportRollbackDeltas::EntityId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ImportRollbackDeltas::PriorState)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ImportRollbackDeltas::BatchNumber)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ImportRollbackDeltas::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_import_rollback_deltas_job_id")
                            .from(ImportRollbackDeltas::Table, ImportRollbackDeltas::JobId)
                            .to(ImportJobs::Table, ImportJobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_import_rollback_deltas_job_id")
                    .table(ImportRollbackDeltas::Table)
                    .col(ImportRollbackDeltas::JobId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ImportRollbackDeltas::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ImportRollbackDeltas {
    Table,
    Id,
    JobId,
    TenantId,
    Action,
    EntityType,
    EntityId,
    PriorState,
    BatchNumber,
    CreatedAt,
}
