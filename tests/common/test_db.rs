//! File-backed SQLite databases standing in for the shared store.
//!
//! Each call to [`TestDatabase::connect`] opens an independent pool on the
//! same file, which is how a test plays several service instances.

#![allow(clippy::duplicate_mod)]

use certkeeper::config::DatabaseConfig;
use certkeeper::storage::{create_pool, DbPool};
use tempfile::TempDir;

/// A migrated SQLite file in a temporary directory, removed on drop.
pub struct TestDatabase {
    pub url: String,
    _dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("Failed to create temp dir: {}", e));
        let url = format!("sqlite://{}", dir.path().join("certkeeper.db").display());
        Self { url, _dir: dir }
    }

    pub fn config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.url.clone(),
            max_connections: 4,
            auto_migrate: true,
            ..Default::default()
        }
    }

    /// Open a new pool, as a separate instance would.
    pub async fn connect(&self) -> DbPool {
        create_pool(&self.config())
            .await
            .unwrap_or_else(|e| panic!("Failed to open test database {}: {}", self.url, e))
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}
