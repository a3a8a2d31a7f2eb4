//! # Certificate Store Connection Pool
//!
//! One `sqlx::Any` pool per instance. Production instances point at the same
//! PostgreSQL database; development and tests use a SQLite file, which
//! several pools can open at once to stand in for separate instances.

use crate::config::DatabaseConfig;
use crate::errors::{CertKeeperError, Result};
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyConnection, AnyPool, Executor};
use std::time::Duration;

/// Type alias for the database connection pool
pub type DbPool = AnyPool;

const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a database connection pool with the specified configuration
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    validate_config(config)?;

    sqlx::any::install_default_drivers();

    let mut pool_options = AnyPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout())
        .test_before_acquire(true)
        .idle_timeout(config.idle_timeout());

    if config.is_sqlite() {
        // Every in-memory connection is its own database; pin a single one for the pool's lifetime.
        if config.is_in_memory() {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(0)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        pool_options = pool_options.after_connect(|conn: &mut AnyConnection, _meta| {
            Box::pin(async move {
                conn.execute("PRAGMA journal_mode = WAL").await?;
                conn.execute(
                    format!("PRAGMA busy_timeout = {}", SQLITE_BUSY_TIMEOUT.as_millis()).as_str(),
                )
                .await?;
                Ok(())
            })
        });
    }

    let pool = pool_options.connect(&connect_url(config)).await.map_err(|e| {
        tracing::error!(
            error = %e,
            url = %sanitize_url(&config.url),
            "Failed to create database pool"
        );
        CertKeeperError::store(
            e,
            format!("Failed to connect to database: {}", sanitize_url(&config.url)),
        )
    })?;

    tracing::info!(
        database_type = if config.is_sqlite() { "sqlite" } else { "postgresql" },
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_timeout_ms = config.connect_timeout().as_millis(),
        idle_timeout_ms = config.idle_timeout().map(|d| d.as_millis()),
        "Database connection pool created"
    );

    if config.auto_migrate {
        tracing::info!("Auto-migration enabled, running database migrations");
        crate::storage::migrations::run_migrations(&pool).await?;
    }

    Ok(pool)
}

/// SQLite files are created on first use; other URLs pass through untouched.
fn connect_url(config: &DatabaseConfig) -> String {
    if config.is_sqlite() && !config.is_in_memory() && !config.url.contains('?') {
        format!("{}?mode=rwc", config.url)
    } else {
        config.url.clone()
    }
}

/// Validate database configuration
fn validate_config(config: &DatabaseConfig) -> Result<()> {
    if config.max_connections == 0 {
        return Err(CertKeeperError::validation("max_connections must be greater than 0"));
    }

    if config.min_connections > config.max_connections {
        return Err(CertKeeperError::validation(
            "min_connections cannot be greater than max_connections",
        ));
    }

    if config.url.is_empty() {
        return Err(CertKeeperError::validation("database URL cannot be empty"));
    }

    if !config.is_sqlite() && !config.is_postgres() {
        return Err(CertKeeperError::validation(
            "database URL must start with 'sqlite:' or 'postgresql://'",
        ));
    }

    Ok(())
}

/// Sanitize database URL for logging (remove credentials)
pub(crate) fn sanitize_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        if parsed.password().is_some() || !parsed.username().is_empty() {
            format!(
                "{}://***:***@{}{}",
                parsed.scheme(),
                parsed.host_str().unwrap_or("unknown"),
                parsed.path()
            )
        } else {
            url.to_string()
        }
    } else {
        url.to_string()
    }
}

/// Get pool statistics for monitoring
pub fn get_pool_stats(pool: &DbPool) -> PoolStats {
    PoolStats { size: pool.size(), idle: pool.num_idle() }
}

/// Pool statistics for monitoring
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Total connections in the pool
    pub size: u32,
    /// Number of idle connections
    pub idle: usize,
}

impl PoolStats {
    /// Get the number of active connections
    pub fn active(&self) -> u32 {
        self.size.saturating_sub(self.idle as u32)
    }
}
