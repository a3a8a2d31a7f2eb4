//! # Storage and Persistence
//!
//! Shared persistence for issuer certificates. Every service instance
//! points at the same database; the table is the only state they share.

pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repositories;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use crate::config::DatabaseConfig;

pub use memory::InMemoryCertificateStore;
pub use migrations::{
    get_migration_version, list_applied_migrations, run_migrations, validate_migrations,
    MigrationInfo,
};
pub use pool::{create_pool, get_pool_stats, DbPool, PoolStats};
pub use repositories::{CertificateStore, InsertOutcome, ReplaceOutcome, SqlxCertificateStore};

use crate::errors::{CertKeeperError, Result};

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| CertKeeperError::store(e, "Database connectivity check failed"))?;

    Ok(())
}
