//! Common test utilities for tabular-import
//!
//! - Row and mapping fixtures
//! - A pipeline harness over in-memory stores
//! - In-memory SQLite database support

pub mod database;
pub mod fixtures;

pub use database::TestDatabase;
pub use fixtures::{PipelineHarness, menu_mapping, menu_rows, settings};
