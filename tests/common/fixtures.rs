//! Test fixtures and factories

use serde_json::json;
use std::sync::Arc;
use tabular_import::config::ImportSettings;
use tabular_import::core::import::{
    FieldMapping, FieldTransform, ImportPipeline, RawRow, TenantContext,
};
use tabular_import::storage::StorageLayer;
use tabular_import::storage::cache::MemoryCache;
use tabular_import::storage::jobs::MemoryJobStore;
use tabular_import::storage::records::MemoryRecordStore;

/// Mapping for rows produced by [`menu_rows`]
pub fn menu_mapping() -> FieldMapping {
    FieldMapping::new()
        .map("Item Name", "name")
        .map_with("Price", "price", FieldTransform::Number)
        .map("SKU", "external_id")
        .map("Category", "category")
}

/// `count` valid menu rows keyed `sku-{i}`, all at `price`
pub fn menu_rows_priced(count: usize, price: &str) -> Vec<RawRow> {
    (0..count)
        .map(|i| {
            json!({
                "Item Name": format!("Item {}", i),
                "Price": price,
                "SKU": format!("sku-{}", i),
                "Category": if i % 2 == 0 { "Mains" } else { "Sides" },
            })
            .as_object()
            .cloned()
            .expect("fixture row is an object")
        })
        .collect()
}

pub fn menu_rows(count: usize) -> Vec<RawRow> {
    menu_rows_priced(count, "9.50")
}

/// Fast settings: tiny backoff, given batch size
pub fn settings(batch_size: usize) -> ImportSettings {
    ImportSettings {
        batch_size,
        retry_backoff_ms: 1,
        ..ImportSettings::default()
    }
}

/// Pipeline over in-memory stores, keeping typed handles for assertions
pub struct PipelineHarness {
    pub pipeline: ImportPipeline,
    pub cache: Arc<MemoryCache>,
    pub jobs: Arc<MemoryJobStore>,
    pub records: Arc<MemoryRecordStore>,
    pub ctx: TenantContext,
}

impl PipelineHarness {
    pub fn new(settings: ImportSettings) -> Self {
        let cache = Arc::new(MemoryCache::new());
        let jobs = Arc::new(MemoryJobStore::new());
        let records = Arc::new(MemoryRecordStore::new());
        let storage = StorageLayer::with_backends(cache.clone(), jobs.clone(), records.clone());

        Self {
            pipeline: ImportPipeline::new(storage, settings),
            cache,
            jobs,
            records,
            ctx: TenantContext::new("acme"),
        }
    }
}
