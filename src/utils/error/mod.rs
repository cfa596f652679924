//! Error handling for the import pipeline
//!
//! This module defines all error types used throughout the crate.

#![allow(missing_docs)]

mod helpers;
mod response;
mod types;

// Re-export all public types
pub use response::{ErrorDetail, ErrorResponse};
pub use types::{ImportError, Result};
