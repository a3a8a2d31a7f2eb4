//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` wins over the
//! configured level so operators can raise verbosity per module.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{CertKeeperError, Result};

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed; callers that may run more
/// than once (tests, embedded use) can ignore that error.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| {
            CertKeeperError::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })?;

    let builder = fmt().with_env_filter(filter).with_target(true);

    let installed = if config.json_logging {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| {
        CertKeeperError::config_with_source("Failed to install tracing subscriber", e)
    })
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        service_name = %config.observability.service_name,
        issuer_uri = %config.issuer.uri,
        certificate_expiration_days = config.issuer.certificate_expiration_days,
        pre_provisioned_certificate = config.issuer.certificate.is_some(),
        database_type = if config.database.is_sqlite() { "sqlite" } else { "postgresql" },
        database_url = %crate::storage::pool::sanitize_url(&config.database.url),
        auto_migrate = config.database.auto_migrate,
        "certkeeper configuration"
    );
}
