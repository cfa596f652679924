//! Target-entity persistence used by the row processors and the rollback engine

mod memory;

pub use memory::MemoryRecordStore;

use crate::core::import::types::EntityRecord;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Tenant-scoped entity storage
#[async_trait]
pub trait RecordStore: Send + Sync + Debug {
    /// Open a transaction spanning one batch
    async fn begin(&self, tenant: &str) -> Result<Box<dyn RecordTransaction>>;

    async fn get(&self, tenant: &str, entity_type: &str, id: &str) -> Result<Option<EntityRecord>>;

    /// Delete by id; returns false when the entity was already absent
    async fn delete(&self, tenant: &str, entity_type: &str, id: &str) -> Result<bool>;

    /// Write `record` verbatim, inserting it if it no longer exists
    async fn restore(&self, tenant: &str, record: &EntityRecord) -> Result<()>;

    async fn list(&self, tenant: &str, entity_type: &str) -> Result<Vec<EntityRecord>>;
}

/// Unit of work over a [`RecordStore`]. Dropping it without `commit` discards
/// every staged write.
#[async_trait]
pub trait RecordTransaction: Send {
    /// Look up by natural identity, seeing this transaction's own writes
    async fn find_by_key(
        &mut self,
        entity_type: &str,
        natural_key: &str,
    ) -> Result<Option<EntityRecord>>;

    async fn insert(&mut self, record: &EntityRecord) -> Result<()>;

    async fn update(&mut self, record: &EntityRecord) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
