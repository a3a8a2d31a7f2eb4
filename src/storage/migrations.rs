//! # Database Migration Management
//!
//! Schema migrations live in `migrations/` and are embedded into the binary
//! at compile time, so every instance carries the same schema definition.

use crate::errors::{CertKeeperError, Result};
use crate::storage::DbPool;
use serde::{Deserialize, Serialize};
use sqlx::migrate::Migrator;
use sqlx::Row;
use tracing::{info, warn};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Migration information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationInfo {
    pub version: i64,
    pub description: String,
}

/// Run all pending database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    info!("Starting database migration process");

    MIGRATOR.run(pool).await.map_err(|e| {
        tracing::error!(error = %e, "Database migration failed");
        CertKeeperError::from(e)
    })?;

    let latest = MIGRATOR.iter().map(|m| m.version).max().unwrap_or(0);
    info!(version = latest, "Database migrations applied");
    Ok(())
}

/// Check that exactly the embedded migrations are applied
pub async fn validate_migrations(pool: &DbPool) -> Result<bool> {
    let applied: Vec<i64> =
        list_applied_migrations(pool).await?.iter().map(|m| m.version).collect();
    let expected: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();

    for version in &expected {
        if !applied.contains(version) {
            warn!(version = version, "Missing migration");
            return Ok(false);
        }
    }

    for version in &applied {
        if !expected.contains(version) {
            warn!(version = version, "Unexpected migration found");
            return Ok(false);
        }
    }

    Ok(true)
}

/// Get the current migration version (highest applied)
pub async fn get_migration_version(pool: &DbPool) -> Result<i64> {
    let applied = list_applied_migrations(pool).await?;
    Ok(applied.into_iter().map(|m| m.version).max().unwrap_or(0))
}

/// List all applied migrations
pub async fn list_applied_migrations(pool: &DbPool) -> Result<Vec<MigrationInfo>> {
    let rows = sqlx::query(
        "SELECT version, description FROM _sqlx_migrations WHERE success = true ORDER BY version",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| CertKeeperError::store(e, "Failed to list applied migrations"))?;

    rows.into_iter()
        .map(|row| -> Result<MigrationInfo> {
            Ok(MigrationInfo {
                version: row.try_get("version")?,
                description: row.try_get("description")?,
            })
        })
        .collect()
}
