use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Import job database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "import_jobs")]
pub struct Model {
    /// Job ID (UUID string)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub tenant_id: String,

    /// Import type discriminator ("menu", "category")
    pub import_type: String,

    pub status: String,

    pub total_records: i64,

    pub processed_records: i64,

    pub successful_imports: i64,

    pub failed_imports: i64,

    pub progress_percentage: i32,

    /// Field mapping rules (JSON)
    #[sea_orm(column_type = "Text")]
    pub field_mapping: String,

    /// Sampled row errors (JSON array)
    #[sea_orm(column_type = "Text")]
    pub errors: String,

    pub created_at: DateTimeWithTimeZone,

    pub started_at: Option<DateTimeWithTimeZone>,

    pub completed_at: Option<DateTimeWithTimeZone>,

    pub processing_time_seconds: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::import_rollback_delta::Entity")]
    RollbackDeltas,
}

impl Related<super::import_rollback_delta::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RollbackDeltas.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
