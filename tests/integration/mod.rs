//! Integration tests for tabular-import
//!
//! These tests drive the public pipeline API over real store implementations.

pub mod config_tests;
pub mod database_tests;
pub mod pipeline_tests;
pub mod rollback_tests;
