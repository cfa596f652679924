//! Shared data types of the import pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::utils::error::ImportError;

/// One decoded input row: source column name to raw cell value
pub type RawRow = serde_json::Map<String, Value>;

/// Field values after mapping: target field name to value
pub type MappedFields = serde_json::Map<String, Value>;

/// Explicit tenant scope passed into every pipeline call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: String,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
        }
    }
}

/// Domain discriminator of an import job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportType {
    Menu,
    Category,
}

impl ImportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportType::Menu => "menu",
            ImportType::Category => "category",
        }
    }

    /// Entity type written by processors of this import type
    pub fn entity_type(&self) -> &'static str {
        match self {
            ImportType::Menu => "menu_item",
            ImportType::Category => "category",
        }
    }
}

impl fmt::Display for ImportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportType {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "menu" => Ok(ImportType::Menu),
            "category" => Ok(ImportType::Category),
            other => Err(ImportError::bad_request(format!(
                "Unknown import type: {}",
                other
            ))),
        }
    }
}

/// Optional value transform applied while mapping a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTransform {
    Trim,
    Lowercase,
    Uppercase,
    Number,
    Boolean,
}

/// Mapping rule for one source column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Target field on the projected row
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<FieldTransform>,
}

/// Source-column to target-field rules of a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping {
    pub rules: BTreeMap<String, FieldRule>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plain column rename
    pub fn map(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.rules.insert(
            source.into(),
            FieldRule {
                target: target.into(),
                transform: None,
            },
        );
        self
    }

    /// Add a column rename with a transform
    pub fn map_with(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        transform: FieldTransform,
    ) -> Self {
        self.rules.insert(
            source.into(),
            FieldRule {
                target: target.into(),
                transform: Some(transform),
            },
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether some column maps onto `target`
    pub fn targets(&self, target: &str) -> bool {
        self.rules.values().any(|rule| rule.target == target)
    }
}

/// A recorded per-row failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    /// Absolute, zero-based row index within the job input
    pub row: usize,
    pub message: String,
    /// Sanitized snapshot of the offending row
    pub data: Value,
}

/// A recorded per-row warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowWarning {
    pub row: usize,
    pub message: String,
}

/// Outcome of one batch execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_number: usize,
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub errors: Vec<RowError>,
    pub warnings: Vec<RowWarning>,
    /// Set when the batch stopped early because the job was cancelled
    #[serde(default)]
    pub interrupted: bool,
    pub completed_at: DateTime<Utc>,
}

impl BatchResult {
    pub fn empty(batch_number: usize) -> Self {
        Self {
            batch_number,
            processed: 0,
            successful: 0,
            failed: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            interrupted: false,
            completed_at: Utc::now(),
        }
    }
}

/// Cache-resident running aggregate of a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub completed_batches: u64,
    pub total_processed: u64,
    pub total_successful: u64,
    pub total_failed: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Batch layout recorded at scheduling time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub total_batches: usize,
    pub total_rows: usize,
    pub batch_size: usize,
}

/// Kind of write a rollback delta reverses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaAction {
    Create,
    Update,
}

impl DeltaAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaAction::Create => "create",
            DeltaAction::Update => "update",
        }
    }
}

impl FromStr for DeltaAction {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(DeltaAction::Create),
            "update" => Ok(DeltaAction::Update),
            other => Err(ImportError::internal(format!(
                "Unknown rollback action: {}",
                other
            ))),
        }
    }
}

/// One reversible write recorded by a batch worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackDelta {
    pub action: DeltaAction,
    pub entity_type: String,
    pub entity_id: String,
    /// Full record as it was before an update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_state: Option<EntityRecord>,
    pub batch_number: usize,
}

impl RollbackDelta {
    pub fn created(record: &EntityRecord, batch_number: usize) -> Self {
        Self {
            action: DeltaAction::Create,
            entity_type: record.entity_type.clone(),
            entity_id: record.id.clone(),
            prior_state: None,
            batch_number,
        }
    }

    pub fn updated(prior: EntityRecord, batch_number: usize) -> Self {
        Self {
            action: DeltaAction::Update,
            entity_type: prior.entity_type.clone(),
            entity_id: prior.id.clone(),
            prior_state: Some(prior),
            batch_number,
        }
    }
}

/// A persisted target entity written by the row processors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub entity_type: String,
    /// Natural identity used for update-if-exists matching
    pub natural_key: String,
    pub fields: Value,
}
