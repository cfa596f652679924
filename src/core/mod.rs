//! Core functionality for the import service
//!
//! This module contains the batch import pipeline and its collaborators.

pub mod import;
