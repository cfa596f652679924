use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One reversible write recorded against an import job.
/// The auto-increment id preserves insertion order.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "import_rollback_deltas")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub job_id: String,

    pub tenant_id: String,

    /// "create" or "update"
    pub action: String,

    pub entity_type: String,

    pub entity_id: String,

    /// Full prior record for updates (JSON)
    #[sea_orm(column_type = "Text", nullable)]
    pub prior_state: Option<String>,

    pub batch_number: i32,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::import_job::Entity",
        from = "Column::JobId",
        to = "super::import_job::Column::Id",
        on_delete = "Cascade"
    )]
    ImportJob,
}

impl Related<super::import_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ImportJob.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
