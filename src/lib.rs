//! # tabular-import
//!
//! Batch import pipeline for large tabular datasets.
//!
//! ## Features
//!
//! - **Batched**: rows are split into fixed-size batches, each committed in its own transaction
//! - **Retryable**: systemic failures retry a batch with backoff; bad rows never do
//! - **Cancellable**: a cooperative flag stops work between rows
//! - **Reversible**: every entity write records a delta that rollback replays backwards
//! - **Multi-tenant**: every call, cache key and record is scoped by tenant
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tabular_import::core::import::{
//!     ImportPipeline, ImportType, ParseOptions, PreparsedRows, TenantContext,
//! };
//! use tabular_import::config::ImportSettings;
//! use tabular_import::storage::StorageLayer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = ImportPipeline::new(StorageLayer::in_memory(), ImportSettings::default());
//!     let ctx = TenantContext::new("acme");
//!
//!     let rows = serde_json::from_str(r#"[{"Item Name": "Burger", "Price": "9.50"}]"#)?;
//!     let parser = PreparsedRows::new(rows);
//!     let job = pipeline
//!         .import_file(&ctx, ImportType::Menu, &parser, None, &ParseOptions::default())
//!         .await?;
//!
//!     pipeline.wait_idle().await;
//!     println!("{:?}", pipeline.status(&ctx, job.id).await?.status);
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod core;
pub mod server;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use core::import::{ImportPipeline, ImportStatus, ImportType, TenantContext};
pub use utils::error::{ImportError, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
