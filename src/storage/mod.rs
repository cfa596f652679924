//! Storage layer for the import service
//!
//! This module provides the shared cache, durable job records and the target
//! entity store, each with an in-memory and an external backend.

/// Shared cache module
pub mod cache;
/// Database storage module
pub mod database;
/// Import job persistence
pub mod jobs;
/// Target entity persistence
pub mod records;

use crate::config::StorageConfig;
use crate::utils::error::Result;
use cache::{MemoryCache, SharedCache};
use database::SeaOrmDatabase;
use jobs::{JobStore, MemoryJobStore};
use records::{MemoryRecordStore, RecordStore};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Main storage layer that wires the configured backends
#[derive(Debug, Clone)]
pub struct StorageLayer {
    /// Cross-batch coordination cache
    pub cache: Arc<dyn SharedCache>,
    /// Durable import job records
    pub jobs: Arc<dyn JobStore>,
    /// Entities written by the row processors
    pub records: Arc<dyn RecordStore>,
    /// Database handle when the relational backend is enabled
    pub database: Option<Arc<SeaOrmDatabase>>,
}

impl StorageLayer {
    /// Create a new storage layer
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        info!("Initializing storage layer");

        let (jobs, records, database): (Arc<dyn JobStore>, Arc<dyn RecordStore>, _) =
            if config.database.enabled {
                debug!("Connecting to database");
                let db = Arc::new(SeaOrmDatabase::new(&config.database).await?);
                db.migrate().await?;
                let jobs: Arc<dyn JobStore> = db.clone();
                let records: Arc<dyn RecordStore> = db.clone();
                (jobs, records, Some(db))
            } else {
                debug!("Database disabled, using in-memory stores");
                (
                    Arc::new(MemoryJobStore::new()),
                    Arc::new(MemoryRecordStore::new()),
                    None,
                )
            };

        let cache = Self::build_cache(config).await?;

        info!("Storage layer initialized successfully");
        Ok(Self {
            cache,
            jobs,
            records,
            database,
        })
    }

    /// Fully in-memory storage
    pub fn in_memory() -> Self {
        Self::with_backends(
            Arc::new(MemoryCache::new()),
            Arc::new(MemoryJobStore::new()),
            Arc::new(MemoryRecordStore::new()),
        )
    }

    /// Storage over explicit backends
    pub fn with_backends(
        cache: Arc<dyn SharedCache>,
        jobs: Arc<dyn JobStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            cache,
            jobs,
            records,
            database: None,
        }
    }

    #[cfg(feature = "redis")]
    async fn build_cache(config: &StorageConfig) -> Result<Arc<dyn SharedCache>> {
        if !config.redis.enabled {
            debug!("Redis disabled, using in-memory cache");
            return Ok(Arc::new(MemoryCache::new()));
        }

        // Other instances coordinate through this cache; no local fallback
        debug!("Connecting to Redis");
        let redis = cache::RedisCache::new(&config.redis).await.map_err(|e| {
            error!("Redis connection failed: {}", e);
            e
        })?;
        Ok(Arc::new(redis))
    }

    #[cfg(not(feature = "redis"))]
    async fn build_cache(config: &StorageConfig) -> Result<Arc<dyn SharedCache>> {
        if config.redis.enabled {
            error!("Redis requested but the `redis` feature is disabled");
            return Err(crate::utils::error::ImportError::config(
                "storage.redis.enabled requires the `redis` feature",
            ));
        }
        Ok(Arc::new(MemoryCache::new()))
    }

    /// Health check for all storage backends
    pub async fn health_check(&self) -> StorageHealthStatus {
        let cache = match self.cache.health_check().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Cache health check failed: {}", e);
                false
            }
        };

        let database = match &self.database {
            Some(db) => match db.health_check().await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Database health check failed: {}", e);
                    false
                }
            },
            None => true,
        };

        StorageHealthStatus {
            cache,
            database,
            overall: cache && database,
        }
    }
}

/// Storage health status
#[derive(Debug, Clone, serde::Serialize)]
pub struct StorageHealthStatus {
    /// Cache health status
    pub cache: bool,
    /// Database health status (true when not configured)
    pub database: bool,
    /// Overall health status
    pub overall: bool,
}
