use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Target entity written by import row processors
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "import_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub tenant_id: String,

    pub entity_type: String,

    /// Natural identity, unique per tenant and entity type
    pub natural_key: String,

    /// Entity fields (JSON object)
    #[sea_orm(column_type = "Text")]
    pub fields: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
