use crate::core::import::types::EntityRecord;
use crate::storage::records::{RecordStore, RecordTransaction};
use crate::utils::error::{ImportError, Result};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::*;
use tracing::debug;

use super::super::entities::{self, import_record};
use super::SeaOrmDatabase;

fn record_from_model(model: import_record::Model) -> Result<EntityRecord> {
    Ok(EntityRecord {
        id: model.id,
        entity_type: model.entity_type,
        natural_key: model.natural_key,
        fields: serde_json::from_str(&model.fields)?,
    })
}

fn new_active_model(tenant: &str, record: &EntityRecord) -> Result<import_record::ActiveModel> {
    let now: DateTimeWithTimeZone = Utc::now().into();
    Ok(import_record::ActiveModel {
        id: Set(record.id.clone()),
        tenant_id: Set(tenant.to_string()),
        entity_type: Set(record.entity_type.clone()),
        natural_key: Set(record.natural_key.clone()),
        fields: Set(serde_json::to_string(&record.fields)?),
        created_at: Set(now),
        updated_at: Set(now),
    })
}

async fn find_record<C: ConnectionTrait>(
    conn: &C,
    tenant: &str,
    entity_type: &str,
    id: &str,
) -> Result<Option<import_record::Model>> {
    entities::ImportRecord::find_by_id(id.to_string())
        .filter(import_record::Column::TenantId.eq(tenant))
        .filter(import_record::Column::EntityType.eq(entity_type))
        .one(conn)
        .await
        .map_err(ImportError::Database)
}

async fn overwrite_record<C: ConnectionTrait>(
    conn: &C,
    tenant: &str,
    record: &EntityRecord,
) -> Result<u64> {
    let now: DateTimeWithTimeZone = Utc::now().into();
    let result = entities::ImportRecord::update_many()
        .col_expr(
            import_record::Column::NaturalKey,
            Expr::value(record.natural_key.clone()),
        )
        .col_expr(
            import_record::Column::Fields,
            Expr::value(serde_json::to_string(&record.fields)?),
        )
        .col_expr(import_record::Column::UpdatedAt, Expr::value(now))
        .filter(import_record::Column::Id.eq(record.id.clone()))
        .filter(import_record::Column::TenantId.eq(tenant))
        .filter(import_record::Column::EntityType.eq(record.entity_type.clone()))
        .exec(conn)
        .await
        .map_err(ImportError::Database)?;
    Ok(result.rows_affected)
}

#[async_trait]
impl RecordStore for SeaOrmDatabase {
    async fn begin(&self, tenant: &str) -> Result<Box<dyn RecordTransaction>> {
        let tx = self.db.begin().await.map_err(ImportError::Database)?;
        Ok(Box::new(SeaOrmRecordTransaction {
            tx,
            tenant: tenant.to_string(),
        }))
    }

    async fn get(&self, tenant: &str, entity_type: &str, id: &str) -> Result<Option<EntityRecord>> {
        find_record(&self.db, tenant, entity_type, id)
            .await?
            .map(record_from_model)
            .transpose()
    }

    async fn delete(&self, tenant: &str, entity_type: &str, id: &str) -> Result<bool> {
        let result = entities::ImportRecord::delete_many()
            .filter(import_record::Column::Id.eq(id))
            .filter(import_record::Column::TenantId.eq(tenant))
            .filter(import_record::Column::EntityType.eq(entity_type))
            .exec(&self.db)
            .await
            .map_err(ImportError::Database)?;
        Ok(result.rows_affected > 0)
    }

    async fn restore(&self, tenant: &str, record: &EntityRecord) -> Result<()> {
        debug!("Restoring {} {}", record.entity_type, record.id);
        if overwrite_record(&self.db, tenant, record).await? == 0 {
            entities::ImportRecord::insert(new_active_model(tenant, record)?)
                .exec(&self.db)
                .await
                .map_err(ImportError::Database)?;
        }
        Ok(())
    }

    async fn list(&self, tenant: &str, entity_type: &str) -> Result<Vec<EntityRecord>> {
        entities::ImportRecord::find()
            .filter(import_record::Column::TenantId.eq(tenant))
            .filter(import_record::Column::EntityType.eq(entity_type))
            .order_by_asc(import_record::Column::NaturalKey)
            .all(&self.db)
            .await
            .map_err(ImportError::Database)?
            .into_iter()
            .map(record_from_model)
            .collect()
    }
}

/// One database transaction per batch
pub struct SeaOrmRecordTransaction {
    tx: DatabaseTransaction,
    tenant: String,
}

#[async_trait]
impl RecordTransaction for SeaOrmRecordTransaction {
    async fn find_by_key(
        &mut self,
        entity_type: &str,
        natural_key: &str,
    ) -> Result<Option<EntityRecord>> {
        entities::ImportRecord::find()
            .filter(import_record::Column::TenantId.eq(self.tenant.as_str()))
            .filter(import_record::Column::EntityType.eq(entity_type))
            .filter(import_record::Column::NaturalKey.eq(natural_key))
            .one(&self.tx)
            .await
            .map_err(ImportError::Database)?
            .map(record_from_model)
            .transpose()
    }

    async fn insert(&mut self, record: &EntityRecord) -> Result<()> {
        entities::ImportRecord::insert(new_active_model(&self.tenant, record)?)
            .exec(&self.tx)
            .await
            .map_err(ImportError::Database)?;
        Ok(())
    }

    async fn update(&mut self, record: &EntityRecord) -> Result<()> {
        if overwrite_record(&self.tx, &self.tenant, record).await? == 0 {
            return Err(ImportError::not_found(format!(
                "{} {} disappeared during update",
                record.entity_type, record.id
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| ImportError::transaction(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(ImportError::Database)
    }
}
