//! Boundary traits for the collaborators the pipeline consumes
//!
//! File decoding, column mapping and rule evaluation live outside the core.
//! The crate ships default adapters for each (`parser`, `mapping`,
//! `validation`) so the pipeline runs end to end.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::types::{FieldMapping, ImportType, MappedFields, RawRow};
use crate::utils::error::Result;

/// Options for a full parse
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Drop rows whose cells are all empty
    #[serde(default)]
    pub skip_empty_rows: bool,
    /// Stop after this many rows
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Source of decoded rows
#[async_trait]
pub trait FileParser: Send + Sync {
    async fn parse(&self, options: &ParseOptions) -> Result<Vec<RawRow>>;

    async fn sample_rows(&self, limit: usize, offset: usize) -> Result<Vec<RawRow>>;

    async fn headers(&self) -> Result<Vec<String>>;

    async fn row_count(&self) -> Result<usize>;

    /// Rows in chunks of at most `chunk_size`
    fn stream_chunks(&self, chunk_size: usize) -> BoxStream<'_, Result<Vec<RawRow>>>;
}

/// Projects source columns onto target fields
#[cfg_attr(test, mockall::automock)]
pub trait FieldMapper: Send + Sync {
    fn detect_mappings(
        &self,
        headers: &[String],
        sample: &[RawRow],
        import_type: ImportType,
    ) -> FieldMapping;

    fn apply_mappings(&self, row: &RawRow, mapping: &FieldMapping) -> Result<MappedFields>;

    /// 0..=100
    fn confidence(&self, mapping: &FieldMapping, import_type: ImportType) -> u8;
}

/// Outcome of validating one mapped row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl RowValidation {
    pub fn from_findings(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// Evaluates validation rules against a mapped row
#[cfg_attr(test, mockall::automock)]
pub trait ValidationEngine: Send + Sync {
    fn validate_row(
        &self,
        row: &MappedFields,
        row_number: usize,
        mapping: &FieldMapping,
        import_type: ImportType,
    ) -> RowValidation;
}
