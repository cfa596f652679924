//! Import pipeline settings

use super::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for batching, retries, cache lifetimes and progress persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSettings {
    /// Rows per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Attempts per batch before it is dead-lettered
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wall-clock budget per batch attempt, in seconds
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
    /// Base delay between attempts, doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Lifetime of batch results, summaries and batch config in the cache
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,
    /// Lifetime of the cancellation flag
    #[serde(default = "default_cancellation_ttl_secs")]
    pub cancellation_ttl_secs: u64,
    /// Persist counters to the job record each time progress crosses a multiple of this
    #[serde(default = "default_persist_step_percent")]
    pub persist_step_percent: u8,
    /// Batches executed concurrently by the local work queue
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    /// Maximum characters kept per string value in error snapshots
    #[serde(default = "default_preview_length")]
    pub preview_length: usize,
    /// Row errors kept on the finalized job record
    #[serde(default = "default_max_error_samples")]
    pub max_error_samples: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            batch_timeout_secs: default_batch_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
            result_ttl_secs: default_result_ttl_secs(),
            cancellation_ttl_secs: default_cancellation_ttl_secs(),
            persist_step_percent: default_persist_step_percent(),
            worker_concurrency: default_worker_concurrency(),
            preview_length: default_preview_length(),
            max_error_samples: default_max_error_samples(),
        }
    }
}

impl ImportSettings {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    pub fn cancellation_ttl(&self) -> Duration {
        Duration::from_secs(self.cancellation_ttl_secs)
    }
}
