//! Test database utilities
//!
//! Each test gets an isolated in-memory SQLite database with migrations applied.

use std::sync::Arc;
use tabular_import::config::DatabaseConfig;
use tabular_import::storage::database::SeaOrmDatabase;

/// Test database wrapper providing isolated in-memory SQLite instances
#[derive(Debug, Clone)]
pub struct TestDatabase {
    inner: Arc<SeaOrmDatabase>,
}

impl TestDatabase {
    pub fn config() -> DatabaseConfig {
        DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            // In-memory SQLite is per connection
            max_connections: 1,
            connection_timeout: 5,
            enabled: true,
        }
    }

    pub async fn new() -> Self {
        let db = SeaOrmDatabase::new(&Self::config())
            .await
            .expect("Failed to create in-memory test database");
        db.migrate()
            .await
            .expect("Failed to run database migrations");

        Self {
            inner: Arc::new(db),
        }
    }

    pub fn db(&self) -> Arc<SeaOrmDatabase> {
        self.inner.clone()
    }
}
