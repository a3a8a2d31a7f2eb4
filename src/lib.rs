//! # certkeeper
//!
//! Shared signing and encryption certificates for a token issuer that runs
//! as several stateless instances behind a load balancer.
//!
//! Every instance must sign with, and decrypt for, the same certificates.
//! certkeeper keeps them in one database table. The first instance to need a
//! certificate generates it and races the others to persist it; an expired
//! certificate is replaced the same way. Optimistic concurrency on the row
//! decides each race, so all instances converge on one certificate per type
//! without a lock service.
//!
//! ## Architecture
//!
//! ```text
//! CredentialsProvider → KeyManager → InMemoryCertificateCache
//!                           ↓
//!          CertificateGenerator    CertificateStore (shared SQL table)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use certkeeper::config::AppConfig;
//! use certkeeper::keys::{CredentialsProvider, KeyManager};
//! use certkeeper::storage::{create_pool, SqlxCertificateStore};
//!
//! #[tokio::main]
//! async fn main() -> certkeeper::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let pool = create_pool(&config.database).await?;
//!     let store = Arc::new(SqlxCertificateStore::new(pool));
//!     let manager = Arc::new(KeyManager::from_config(&config.issuer, store)?);
//!
//!     let credentials = CredentialsProvider::new(manager);
//!     let signing = credentials.signing_credentials().await?;
//!     println!("signing with {}", signing.key_id);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod keys;
pub mod observability;
pub mod storage;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{CertKeeperError, Error, Result};
pub use keys::{Certificate, CertificateType, CredentialsProvider, KeyManager};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
