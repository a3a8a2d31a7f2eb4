//! # Configuration Management
//!
//! Environment-driven settings for the issuer, the shared store and logging.

pub mod settings;

pub use settings::{
    AppConfig, DatabaseConfig, ExternalCertificateConfig, IssuerConfig, ObservabilityConfig,
    DEFAULT_CERTIFICATE_EXPIRATION_DAYS,
};
