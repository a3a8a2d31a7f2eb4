//! # Application Settings
//!
//! Settings are read from environment variables. Values that are missing
//! fall back to development defaults; values that are present but malformed
//! are rejected.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{CertKeeperError, Result, ProvisioningError};

/// Default lifetime of generated certificates.
pub const DEFAULT_CERTIFICATE_EXPIRATION_DAYS: u32 = 30;

/// Source of named settings; the process environment in production.
pub(crate) type VarSource<'a> = &'a dyn Fn(&str) -> Option<String>;

fn env_source(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|value| value.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_var<T>(var: VarSource<'_>, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| CertKeeperError::config(format!("Invalid {} '{}': {}", name, raw, e))),
        None => Ok(default),
    }
}

fn parse_flag(var: VarSource<'_>, name: &str, default: bool) -> bool {
    var(name)
        .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// Token issuer and certificate lifetime
    #[validate(nested)]
    pub issuer: IssuerConfig,

    /// Shared certificate store
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Logging
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        Self::from_source(&env_source)
    }

    pub(crate) fn from_source(var: VarSource<'_>) -> Result<Self> {
        let config = Self {
            issuer: IssuerConfig::from_source(var)?,
            database: DatabaseConfig::from_source(var)?,
            observability: ObservabilityConfig::from_source(var),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(CertKeeperError::from)?;

        self.issuer.issuer_host()?;

        if !self.database.is_sqlite() && !self.database.is_postgres() {
            return Err(CertKeeperError::validation_field(
                "Database URL must start with 'postgresql://' or 'sqlite:'",
                "database.url",
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(CertKeeperError::validation_field(
                "Min connections cannot exceed max connections",
                "database.min_connections",
            ));
        }

        Ok(())
    }
}

/// Token issuer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IssuerConfig {
    /// Public base URI of the token issuer; its host names the certificates
    #[validate(length(min = 1, message = "Issuer URI cannot be empty"))]
    pub uri: String,

    /// Lifetime of generated certificates in days
    #[validate(range(
        min = 1,
        max = 3650,
        message = "Certificate expiration must be between 1 and 3650 days"
    ))]
    pub certificate_expiration_days: u32,

    /// Pre-provisioned certificate served instead of generated ones
    pub certificate: Option<ExternalCertificateConfig>,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            uri: "http://localhost:5443".to_string(),
            certificate_expiration_days: DEFAULT_CERTIFICATE_EXPIRATION_DAYS,
            certificate: None,
        }
    }
}

impl IssuerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_source(&env_source)
    }

    pub(crate) fn from_source(var: VarSource<'_>) -> Result<Self> {
        let defaults = Self::default();

        let uri = var("CERTKEEPER_ISSUER_URI").unwrap_or(defaults.uri);
        let certificate_expiration_days = parse_var(
            var,
            "CERTKEEPER_CERTIFICATE_EXPIRATION_DAYS",
            defaults.certificate_expiration_days,
        )?;

        let certificate = match (
            var("CERTKEEPER_CERTIFICATE_PATH"),
            var("CERTKEEPER_PRIVATE_KEY_PATH"),
        ) {
            (Some(cert_path), Some(key_path)) => Some(ExternalCertificateConfig {
                cert_path: PathBuf::from(cert_path),
                key_path: PathBuf::from(key_path),
            }),
            (None, None) => None,
            _ => return Err(ProvisioningError::IncompleteConfiguration.into()),
        };

        Ok(Self { uri, certificate_expiration_days, certificate })
    }

    /// Host component of the issuer URI, e.g. `auth.example.com`.
    pub fn issuer_host(&self) -> Result<String> {
        let parsed = url::Url::parse(&self.uri).map_err(|e| {
            CertKeeperError::validation_field(
                format!("Invalid issuer URI '{}': {}", self.uri, e),
                "issuer.uri",
            )
        })?;

        parsed.host_str().map(str::to_string).ok_or_else(|| {
            CertKeeperError::validation_field(
                format!("Issuer URI '{}' has no host", self.uri),
                "issuer.uri",
            )
        })
    }
}

/// Paths of a pre-provisioned certificate and its PKCS#8 key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCertificateConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(min = 0, max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./certkeeper.db".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_source(&env_source)
    }

    pub(crate) fn from_source(var: VarSource<'_>) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            url: var("DATABASE_URL").unwrap_or(defaults.url),
            max_connections: parse_var(var, "DATABASE_MAX_CONNECTIONS", defaults.max_connections)?,
            min_connections: parse_var(var, "DATABASE_MIN_CONNECTIONS", defaults.min_connections)?,
            connect_timeout_seconds: parse_var(
                var,
                "DATABASE_CONNECT_TIMEOUT_SECONDS",
                defaults.connect_timeout_seconds,
            )?,
            idle_timeout_seconds: parse_var(
                var,
                "DATABASE_IDLE_TIMEOUT_SECONDS",
                defaults.idle_timeout_seconds,
            )?,
            auto_migrate: parse_flag(var, "DATABASE_AUTO_MIGRATE", defaults.auto_migrate),
        })
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// Check if this is a SQLite configuration
    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite:")
    }

    /// Check if this is a PostgreSQL configuration
    pub fn is_postgres(&self) -> bool {
        self.url.starts_with("postgresql://") || self.url.starts_with("postgres://")
    }

    /// In-memory SQLite databases live and die with a single connection
    pub fn is_in_memory(&self) -> bool {
        self.is_sqlite() && (self.url.contains(":memory:") || self.url.contains("mode=memory"))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Service name attached to startup logs
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "certkeeper".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self::from_source(&env_source)
    }

    pub(crate) fn from_source(var: VarSource<'_>) -> Self {
        let defaults = Self::default();
        Self {
            service_name: var("CERTKEEPER_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: var("CERTKEEPER_LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logging: parse_flag(var, "CERTKEEPER_JSON_LOGGING", defaults.json_logging),
        }
    }
}
