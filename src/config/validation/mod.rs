//! Configuration validation
//!
//! Each configuration section implements [`Validate`]; `Config::validate`
//! wraps section failures into `ImportError::Config`.

mod trait_def;
mod validators;

pub use trait_def::Validate;
