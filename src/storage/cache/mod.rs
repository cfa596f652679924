//! Shared low-latency cache used for cross-batch coordination
//!
//! Every operation that more than one batch worker may touch concurrently
//! (counters, progress thresholds, duplicate guards) goes through an atomic
//! primitive of this trait rather than a get-then-set sequence.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;

use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

/// Key-value cache with per-key TTL and atomic update primitives
#[async_trait]
pub trait SharedCache: Send + Sync + Debug {
    /// Get a string value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a string value with a TTL
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// Check whether a key exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically add `delta` to a hash field and refresh the key's TTL
    async fn hash_increment(&self, key: &str, field: &str, delta: i64, ttl: Duration)
    -> Result<i64>;

    /// Set a hash field and refresh the key's TTL
    async fn hash_set(&self, key: &str, field: &str, value: &str, ttl: Duration) -> Result<()>;

    /// In one atomic step: unless `marker` is already a field of the hash,
    /// set it, apply every increment and set every field, refreshing the TTL.
    ///
    /// Returns the incremented values in order, or `None` when the marker was
    /// present and nothing changed.
    async fn hash_increment_once(
        &self,
        key: &str,
        marker: &str,
        increments: &[(&str, i64)],
        fields: &[(&str, &str)],
        ttl: Duration,
    ) -> Result<Option<Vec<i64>>>;

    /// Get every field of a hash (empty when the key is absent)
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Atomically replace the value of `key` with `new` if its current value
    /// equals `expected` (`None` meaning absent). Returns whether the swap happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool>;

    /// Backend connectivity check
    async fn health_check(&self) -> Result<()>;
}

/// TTL in whole seconds, never zero
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
