//! In-process cache backend

use super::SharedCache;
use crate::utils::error::{ImportError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum CacheValue {
    Text(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CacheValue,
    expires_at: Instant,
}

impl CacheEntry {
    fn text(value: &str, ttl: Duration) -> Self {
        Self {
            value: CacheValue::Text(value.to_string()),
            expires_at: Instant::now() + ttl,
        }
    }

    fn hash(ttl: Duration) -> Self {
        Self {
            value: CacheValue::Hash(HashMap::new()),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

fn wrong_type(key: &str) -> ImportError {
    ImportError::cache(format!(
        "WRONGTYPE operation against key holding the wrong kind of value: {}",
        key
    ))
}

/// Cache backed by a sharded concurrent map; atomic operations run under the
/// per-key entry lock and expired keys are dropped lazily on access.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys starting with `prefix`
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.is_expired() && e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect()
    }

    fn evict_if_expired(&self, key: &str) {
        self.entries.remove_if(key, |_, entry| entry.is_expired());
    }
}

#[async_trait]
impl SharedCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.evict_if_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                CacheValue::Text(value) => Ok(Some(value.clone())),
                CacheValue::Hash(_) => Err(wrong_type(key)),
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), CacheEntry::text(value, ttl));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut removed = 0;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(key) {
                if !entry.is_expired() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.evict_if_expired(key);
        Ok(self.entries.contains_key(key))
    }

    async fn hash_increment(
        &self,
        key: &str,
        field: &str,
        delta: i64,
        ttl: Duration,
    ) -> Result<i64> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::hash(ttl));
        if entry.is_expired() {
            *entry = CacheEntry::hash(ttl);
        }
        entry.expires_at = Instant::now() + ttl;

        match &mut entry.value {
            CacheValue::Hash(fields) => {
                let current = match fields.get(field) {
                    Some(raw) => raw.parse::<i64>().map_err(|_| {
                        ImportError::cache(format!("hash value is not an integer: {}", key))
                    })?,
                    None => 0,
                };
                let next = current + delta;
                fields.insert(field.to_string(), next.to_string());
                Ok(next)
            }
            CacheValue::Text(_) => Err(wrong_type(key)),
        }
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::hash(ttl));
        if entry.is_expired() {
            *entry = CacheEntry::hash(ttl);
        }
        entry.expires_at = Instant::now() + ttl;

        match &mut entry.value {
            CacheValue::Hash(fields) => {
                fields.insert(field.to_string(), value.to_string());
                Ok(())
            }
            CacheValue::Text(_) => Err(wrong_type(key)),
        }
    }

    async fn hash_increment_once(
        &self,
        key: &str,
        marker: &str,
        increments: &[(&str, i64)],
        fields: &[(&str, &str)],
        ttl: Duration,
    ) -> Result<Option<Vec<i64>>> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::hash(ttl));
        if entry.is_expired() {
            *entry = CacheEntry::hash(ttl);
        }

        let CacheValue::Hash(hash) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        if hash.contains_key(marker) {
            return Ok(None);
        }

        // Parse everything first so a bad field leaves the hash untouched
        let mut next = Vec::with_capacity(increments.len());
        for (field, delta) in increments {
            let current = match hash.get(*field) {
                Some(raw) => raw.parse::<i64>().map_err(|_| {
                    ImportError::cache(format!("hash value is not an integer: {}", key))
                })?,
                None => 0,
            };
            next.push(current + delta);
        }

        hash.insert(marker.to_string(), "1".to_string());
        for ((field, _), value) in increments.iter().zip(&next) {
            hash.insert(field.to_string(), value.to_string());
        }
        for (field, value) in fields {
            hash.insert(field.to_string(), value.to_string());
        }
        entry.expires_at = Instant::now() + ttl;
        Ok(Some(next))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        self.evict_if_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                CacheValue::Hash(fields) => Ok(fields.clone()),
                CacheValue::Text(_) => Err(wrong_type(key)),
            },
            None => Ok(HashMap::new()),
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let matches = {
                    let entry = occupied.get();
                    if entry.is_expired() {
                        expected.is_none()
                    } else {
                        match &entry.value {
                            CacheValue::Text(current) => expected == Some(current.as_str()),
                            CacheValue::Hash(_) => return Err(wrong_type(key)),
                        }
                    }
                };
                if matches {
                    occupied.insert(CacheEntry::text(new, ttl));
                }
                Ok(matches)
            }
            Entry::Vacant(vacant) => {
                if expected.is_none() {
                    vacant.insert(CacheEntry::text(new, ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
