//! Utility modules for the import service
//!
//! - **error**: crate-wide error type, HTTP error mapping and classification helpers
//! - **logging**: tracing subscriber initialisation

pub mod error;
pub mod logging;

pub use error::{ImportError, Result};
