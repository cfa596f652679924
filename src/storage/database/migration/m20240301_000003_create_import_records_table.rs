use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ImportRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ImportRecords::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ImportRecords::TenantId).string().not_null())
                    .col(ColumnDef::new(ImportRecords::EntityType).string().not_null())
                    .col(ColumnDef::new(ImportRecords::NaturalKey).string().not_null())
                    .col(ColumnDef::new(ImportRecords::Fields).text().not_null())
                    .col(
                        ColumnDef::new(ImportRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ImportRecords::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Update-if-exists matching relies on this identity being unique
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_import_records_natural_key")
                    .table(ImportRecords::Table)
                    .col(ImportRecords::TenantId)
                    .col(ImportRecords::EntityType)
                    .col(ImportRecords::NaturalKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ImportRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ImportRecords {
    Table,
    Id,
    TenantId,
    EntityType,
    NaturalKey,
    Fields,
    CreatedAt,
    UpdatedAt,
}
