//! Test database utilities for in-library tests.
//!
//! SQLite stands in for the shared database. Each `memory_pool` is private to
//! one test; multi-instance tests live under `tests/` with a file-backed database.

use crate::config::DatabaseConfig;
use crate::storage::{create_pool, DbPool};

/// A migrated, private in-memory database.
pub async fn memory_pool() -> DbPool {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        auto_migrate: true,
        ..Default::default()
    };

    create_pool(&config).await.unwrap_or_else(|e| panic!("Failed to create test pool: {}", e))
}
