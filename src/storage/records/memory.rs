//! In-memory record store with staged, all-or-nothing transactions

use super::{RecordStore, RecordTransaction};
use crate::core::import::types::EntityRecord;
use crate::utils::error::{ImportError, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// (tenant, entity_type, id)
type IdKey = (String, String, String);
/// (tenant, entity_type, natural_key)
type NaturalKey = (String, String, String);

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<IdKey, EntityRecord>,
    by_natural_key: HashMap<NaturalKey, String>,
}

impl Tables {
    fn upsert(&mut self, tenant: &str, record: &EntityRecord) {
        let id_key = (
            tenant.to_string(),
            record.entity_type.clone(),
            record.id.clone(),
        );
        if let Some(previous) = self.records.get(&id_key) {
            self.by_natural_key.remove(&(
                tenant.to_string(),
                previous.entity_type.clone(),
                previous.natural_key.clone(),
            ));
        }
        self.by_natural_key.insert(
            (
                tenant.to_string(),
                record.entity_type.clone(),
                record.natural_key.clone(),
            ),
            record.id.clone(),
        );
        self.records.insert(id_key, record.clone());
    }

    fn remove(&mut self, tenant: &str, entity_type: &str, id: &str) -> bool {
        let id_key = (tenant.to_string(), entity_type.to_string(), id.to_string());
        match self.records.remove(&id_key) {
            Some(record) => {
                self.by_natural_key.remove(&(
                    tenant.to_string(),
                    record.entity_type,
                    record.natural_key,
                ));
                true
            }
            None => false,
        }
    }

    fn find_by_key(
        &self,
        tenant: &str,
        entity_type: &str,
        natural_key: &str,
    ) -> Option<&EntityRecord> {
        let id = self.by_natural_key.get(&(
            tenant.to_string(),
            entity_type.to_string(),
            natural_key.to_string(),
        ))?;
        self.records
            .get(&(tenant.to_string(), entity_type.to_string(), id.clone()))
    }
}

/// Record store kept in process memory.
///
/// Transactions stage their writes and apply them under one write lock on
/// commit. Commit failures can be injected per natural key to exercise the
/// retry path.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    tables: Arc<RwLock<Tables>>,
    commit_faults: Arc<Mutex<HashMap<String, u32>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` commits whose staged writes touch `natural_key`
    pub fn fail_commits_for_key(&self, natural_key: impl Into<String>, times: u32) {
        self.commit_faults.lock().insert(natural_key.into(), times);
    }

    /// Total number of stored records across tenants
    pub fn len(&self) -> usize {
        self.tables.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn begin(&self, tenant: &str) -> Result<Box<dyn RecordTransaction>> {
        Ok(Box::new(MemoryTransaction {
            tenant: tenant.to_string(),
            tables: self.tables.clone(),
            commit_faults: self.commit_faults.clone(),
            staged: Vec::new(),
        }))
    }

    async fn get(&self, tenant: &str, entity_type: &str, id: &str) -> Result<Option<EntityRecord>> {
        Ok(self
            .tables
            .read()
            .records
            .get(&(tenant.to_string(), entity_type.to_string(), id.to_string()))
            .cloned())
    }

    async fn delete(&self, tenant: &str, entity_type: &str, id: &str) -> Result<bool> {
        Ok(self.tables.write().remove(tenant, entity_type, id))
    }

    async fn restore(&self, tenant: &str, record: &EntityRecord) -> Result<()> {
        self.tables.write().upsert(tenant, record);
        Ok(())
    }

    async fn list(&self, tenant: &str, entity_type: &str) -> Result<Vec<EntityRecord>> {
        let mut records: Vec<EntityRecord> = self
            .tables
            .read()
            .records
            .iter()
            .filter(|((owner, kind, _), _)| owner == tenant && kind == entity_type)
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by(|a, b| a.natural_key.cmp(&b.natural_key));
        Ok(records)
    }
}

#[derive(Debug)]
enum StagedWrite {
    Insert(EntityRecord),
    Update(EntityRecord),
}

impl StagedWrite {
    fn record(&self) -> &EntityRecord {
        match self {
            StagedWrite::Insert(record) | StagedWrite::Update(record) => record,
        }
    }
}

struct MemoryTransaction {
    tenant: String,
    tables: Arc<RwLock<Tables>>,
    commit_faults: Arc<Mutex<HashMap<String, u32>>>,
    staged: Vec<StagedWrite>,
}

impl MemoryTransaction {
    fn staged_by_key(&self, entity_type: &str, natural_key: &str) -> Option<&EntityRecord> {
        self.staged
            .iter()
            .rev()
            .map(StagedWrite::record)
            .find(|r| r.entity_type == entity_type && r.natural_key == natural_key)
    }

    fn take_injected_fault(&self) -> Option<String> {
        let mut faults = self.commit_faults.lock();
        for write in &self.staged {
            let key = &write.record().natural_key;
            if let Some(remaining) = faults.get_mut(key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Some(key.clone());
                }
            }
        }
        None
    }
}

#[async_trait]
impl RecordTransaction for MemoryTransaction {
    async fn find_by_key(
        &mut self,
        entity_type: &str,
        natural_key: &str,
    ) -> Result<Option<EntityRecord>> {
        if let Some(record) = self.staged_by_key(entity_type, natural_key) {
            return Ok(Some(record.clone()));
        }
        Ok(self
            .tables
            .read()
            .find_by_key(&self.tenant, entity_type, natural_key)
            .cloned())
    }

    async fn insert(&mut self, record: &EntityRecord) -> Result<()> {
        if self
            .find_by_key(&record.entity_type, &record.natural_key)
            .await?
            .is_some()
        {
            return Err(ImportError::transaction(format!(
                "duplicate {} with key {}",
                record.entity_type, record.natural_key
            )));
        }
        self.staged.push(StagedWrite::Insert(record.clone()));
        Ok(())
    }

    async fn update(&mut self, record: &EntityRecord) -> Result<()> {
        self.staged.push(StagedWrite::Update(record.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if let Some(key) = self.take_injected_fault() {
            debug!("Injected commit failure for key {}", key);
            return Err(ImportError::transaction(format!(
                "commit failed for batch touching {}",
                key
            )));
        }

        let mut tables = self.tables.write();
        // Another transaction may have committed the same natural key since
        // this one looked it up; the retry will then see it and update instead
        for write in &self.staged {
            if let StagedWrite::Insert(record) = write {
                let taken = tables
                    .find_by_key(&self.tenant, &record.entity_type, &record.natural_key)
                    .is_some_and(|existing| existing.id != record.id);
                if taken {
                    return Err(ImportError::transaction(format!(
                        "{} with key {} was created concurrently",
                        record.entity_type, record.natural_key
                    )));
                }
            }
        }
        for write in &self.staged {
            tables.upsert(&self.tenant, write.record());
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
