//! Application state shared across HTTP handlers

use crate::config::Config;
use crate::core::import::ImportPipeline;
use std::sync::Arc;

/// HTTP server state shared across handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Service configuration (shared read-only)
    pub config: Arc<Config>,
    /// Import pipeline, which also owns the storage layer
    pub pipeline: Arc<ImportPipeline>,
}

impl AppState {
    pub fn new(config: Config, pipeline: ImportPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
