//! SeaORM entities

pub mod import_job;
pub mod import_record;
pub mod import_rollback_delta;

pub use import_job::Entity as ImportJob;
pub use import_record::Entity as ImportRecord;
pub use import_rollback_delta::Entity as ImportRollbackDelta;
