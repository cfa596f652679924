//! Typed projected rows and the processors that persist them

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::types::{EntityRecord, ImportType, MappedFields, RollbackDelta};
use crate::storage::records::RecordTransaction;
use crate::utils::error::{ImportError, Result};

/// A menu item as projected from one mapped row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItemRow {
    pub name: String,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_available: Option<bool>,
}

/// A category as projected from one mapped row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRow {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Validated row, one variant per import type
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectedRow {
    MenuItem(MenuItemRow),
    Category(CategoryRow),
}

fn text(fields: &MappedFields, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required_text(fields: &MappedFields, name: &str) -> Result<String> {
    text(fields, name).ok_or_else(|| ImportError::validation(format!("{} is required", name)))
}

fn number(fields: &MappedFields, name: &str) -> Result<Option<f64>> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ImportError::mapping(format!("{} must be a number", name))),
        Some(other) => Err(ImportError::mapping(format!(
            "{} must be a number, got {}",
            name, other
        ))),
    }
}

fn boolean(fields: &MappedFields, name: &str) -> Option<bool> {
    match fields.get(name)? {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

/// Lowercased name with collapsed whitespace
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl ProjectedRow {
    /// Build the typed row for `import_type` from mapped fields
    pub fn project(import_type: ImportType, fields: &MappedFields) -> Result<Self> {
        match import_type {
            ImportType::Menu => Ok(ProjectedRow::MenuItem(MenuItemRow {
                name: required_text(fields, "name")?,
                price: number(fields, "price")?
                    .ok_or_else(|| ImportError::validation("price is required"))?,
                description: text(fields, "description"),
                category: text(fields, "category"),
                external_id: text(fields, "external_id"),
                is_available: boolean(fields, "is_available"),
            })),
            ImportType::Category => Ok(ProjectedRow::Category(CategoryRow {
                name: required_text(fields, "name")?,
                description: text(fields, "description"),
                external_id: text(fields, "external_id"),
                sort_order: number(fields, "sort_order")?.map(|n| n as i64),
                parent: text(fields, "parent"),
            })),
        }
    }

    pub fn import_type(&self) -> ImportType {
        match self {
            ProjectedRow::MenuItem(_) => ImportType::Menu,
            ProjectedRow::Category(_) => ImportType::Category,
        }
    }

    /// External id when present, otherwise the normalised name
    pub fn natural_key(&self) -> String {
        let (external_id, name) = match self {
            ProjectedRow::MenuItem(row) => (&row.external_id, &row.name),
            ProjectedRow::Category(row) => (&row.external_id, &row.name),
        };
        match external_id {
            Some(id) => format!("ext:{}", id),
            None => normalize_name(name),
        }
    }

    pub fn to_fields(&self) -> Result<Value> {
        Ok(match self {
            ProjectedRow::MenuItem(row) => serde_json::to_value(row)?,
            ProjectedRow::Category(row) => serde_json::to_value(row)?,
        })
    }
}

/// Persists one projected row through the batch transaction
#[async_trait]
pub trait RowProcessor: Send + Sync {
    fn import_type(&self) -> ImportType;

    async fn process(
        &self,
        row: &ProjectedRow,
        tx: &mut dyn RecordTransaction,
        batch_number: usize,
    ) -> Result<RollbackDelta>;
}

/// Update-if-exists, else create. Fields absent from `incoming` keep their
/// stored value on update.
pub async fn upsert_entity(
    tx: &mut dyn RecordTransaction,
    entity_type: &str,
    natural_key: String,
    incoming: Value,
    batch_number: usize,
) -> Result<RollbackDelta> {
    match tx.find_by_key(entity_type, &natural_key).await? {
        Some(existing) => {
            let mut fields = existing.fields.clone();
            match (&mut fields, incoming) {
                (Value::Object(stored), Value::Object(new)) => stored.extend(new),
                (slot, new) => *slot = new,
            }
            let updated = EntityRecord {
                fields,
                ..existing.clone()
            };
            tx.update(&updated).await?;
            Ok(RollbackDelta::updated(existing, batch_number))
        }
        None => {
            let record = EntityRecord {
                id: Uuid::new_v4().to_string(),
                entity_type: entity_type.to_string(),
                natural_key,
                fields: incoming,
            };
            tx.insert(&record).await?;
            Ok(RollbackDelta::created(&record, batch_number))
        }
    }
}

fn unexpected_row(expected: ImportType, row: &ProjectedRow) -> ImportError {
    ImportError::mapping(format!(
        "{} processor received a {} row",
        expected,
        row.import_type()
    ))
}

/// Creates or updates menu items
#[derive(Debug, Clone, Copy, Default)]
pub struct MenuItemProcessor;

#[async_trait]
impl RowProcessor for MenuItemProcessor {
    fn import_type(&self) -> ImportType {
        ImportType::Menu
    }

    async fn process(
        &self,
        row: &ProjectedRow,
        tx: &mut dyn RecordTransaction,
        batch_number: usize,
    ) -> Result<RollbackDelta> {
        let ProjectedRow::MenuItem(item) = row else {
            return Err(unexpected_row(ImportType::Menu, row));
        };
        if !item.price.is_finite() {
            return Err(ImportError::validation("price must be finite"));
        }
        upsert_entity(
            tx,
            ImportType::Menu.entity_type(),
            row.natural_key(),
            row.to_fields()?,
            batch_number,
        )
        .await
    }
}

/// Creates or updates categories
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryProcessor;

#[async_trait]
impl RowProcessor for CategoryProcessor {
    fn import_type(&self) -> ImportType {
        ImportType::Category
    }

    async fn process(
        &self,
        row: &ProjectedRow,
        tx: &mut dyn RecordTransaction,
        batch_number: usize,
    ) -> Result<RollbackDelta> {
        let ProjectedRow::Category(category) = row else {
            return Err(unexpected_row(ImportType::Category, row));
        };
        if category
            .parent
            .as_deref()
            .is_some_and(|parent| normalize_name(parent) == normalize_name(&category.name))
        {
            return Err(ImportError::validation("category cannot be its own parent"));
        }
        upsert_entity(
            tx,
            ImportType::Category.entity_type(),
            row.natural_key(),
            row.to_fields()?,
            batch_number,
        )
        .await
    }
}

/// Row processors keyed by import type
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<ImportType, Arc<dyn RowProcessor>>,
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("import_types", &self.processors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in menu and category processors
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MenuItemProcessor));
        registry.register(Arc::new(CategoryProcessor));
        registry
    }

    pub fn register(&mut self, processor: Arc<dyn RowProcessor>) {
        self.processors.insert(processor.import_type(), processor);
    }

    pub fn get(&self, import_type: ImportType) -> Result<Arc<dyn RowProcessor>> {
        self.processors.get(&import_type).cloned().ok_or_else(|| {
            ImportError::invalid_batch_config(format!(
                "No row processor registered for import type {}",
                import_type
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::records::{MemoryRecordStore, RecordStore};
    use crate::core::import::types::DeltaAction;
    use serde_json::json;

    fn fields(value: Value) -> MappedFields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_project_menu_item() {
        let row = ProjectedRow::project(
            ImportType::Menu,
            &fields(json!({"name": " Double  Burger ", "price": "12.5", "is_available": true})),
        )
        .unwrap();

        let ProjectedRow::MenuItem(item) = &row else {
            panic!("expected menu item");
        };
        assert_eq!(item.name, "Double  Burger");
        assert_eq!(item.price, 12.5);
        assert_eq!(item.is_available, Some(true));
        assert_eq!(row.natural_key(), "double burger");
    }

    #[test]
    fn test_project_prefers_external_id_as_key() {
        let row = ProjectedRow::project(
            ImportType::Category,
            &fields(json!({"name": "Drinks", "external_id": "C-7"})),
        )
        .unwrap();
        assert_eq!(row.natural_key(), "ext:C-7");
    }

    #[test]
    fn test_project_requires_price() {
        let err = ProjectedRow::project(ImportType::Menu, &fields(json!({"name": "Burger"})))
            .unwrap_err();
        assert!(matches!(err, ImportError::Validation(_)));
    }

    #[tokio::test]
    async fn test_process_creates_then_updates() {
        let store = MemoryRecordStore::new();
        let processor = MenuItemProcessor;

        let first = ProjectedRow::project(
            ImportType::Menu,
            &fields(json!({"name": "Burger", "price": 9, "description": "Beef"})),
        )
        .unwrap();
        let mut tx = store.begin("acme").await.unwrap();
        let delta = processor.process(&first, tx.as_mut(), 0).await.unwrap();
        assert_eq!(delta.action, DeltaAction::Create);
        tx.commit().await.unwrap();

        let second = ProjectedRow::project(
            ImportType::Menu,
            &fields(json!({"name": "burger", "price": 11})),
        )
        .unwrap();
        let mut tx = store.begin("acme").await.unwrap();
        let delta = processor.process(&second, tx.as_mut(), 1).await.unwrap();
        assert_eq!(delta.action, DeltaAction::Update);
        assert_eq!(delta.prior_state.as_ref().unwrap().fields["price"], 9.0);
        tx.commit().await.unwrap();

        let records = store.list("acme", "menu_item").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields["price"], 11.0);
        // Unmapped fields survive the update
        assert_eq!(records[0].fields["description"], "Beef");
    }

    #[tokio::test]
    async fn test_processor_rejects_foreign_rows() {
        let store = MemoryRecordStore::new();
        let row = ProjectedRow::project(ImportType::Category, &fields(json!({"name": "Drinks"})))
            .unwrap();
        let mut tx = store.begin("acme").await.unwrap();
        let err = MenuItemProcessor.process(&row, tx.as_mut(), 0).await.unwrap_err();
        assert!(matches!(err, ImportError::Mapping(_)));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ProcessorRegistry::with_defaults();
        assert!(registry.get(ImportType::Menu).is_ok());

        let empty = ProcessorRegistry::new();
        assert!(matches!(
            empty.get(ImportType::Category),
            Err(ImportError::InvalidBatchConfig(_))
        ));
    }
}
