//! # Error Types
//!
//! Error taxonomy for the certificate lifecycle using `thiserror`.

use std::fmt;

use crate::errors::ProvisioningError;
use crate::keys::CertificateType;

/// Custom result type for certkeeper operations
pub type Result<T> = std::result::Result<T, CertKeeperError>;

/// Main error type for certkeeper
#[derive(thiserror::Error, Debug)]
pub enum CertKeeperError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// The shared certificate store could not be reached or rejected the query
    #[error("Certificate store unavailable: {context}")]
    StoreUnavailable {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// The crypto provider failed to produce a certificate
    #[error("Failed to generate {certificate_type} certificate: {source}")]
    Generation {
        certificate_type: CertificateType,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A write race was lost and the winning record is unusable
    #[error("Unresolved certificate race for '{key}': {reason}")]
    UnresolvedRace { key: String, reason: RaceFailure },

    /// Another caller's resolution of the same key failed while this caller waited on it
    #[error("Concurrent resolution of '{key}' failed: {message}")]
    JoinedFailure { key: String, message: String, retryable: bool },

    /// A stored record could not be decoded into a certificate
    #[error("Corrupt certificate record '{key}': {message}")]
    CorruptRecord { key: String, message: String },

    /// A certificate could not be turned into a token credential
    #[error("Credential error: {message}")]
    Credential {
        message: String,
        #[source]
        source: Option<jsonwebtoken::errors::Error>,
    },

    /// A pre-provisioned certificate could not be used
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Why the record re-read after a lost write race could not be adopted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceFailure {
    /// The winner's record disappeared between the conflict and the re-read
    WinnerMissing,
    /// The winner's record was already expired when re-read
    WinnerExpired,
}

impl fmt::Display for RaceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceFailure::WinnerMissing => write!(f, "winning record is missing"),
            RaceFailure::WinnerExpired => write!(f, "winning record is already expired"),
        }
    }
}

impl CertKeeperError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a store unavailable error with context
    pub fn store<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::StoreUnavailable { source, context: context.into() }
    }

    /// Create a generation failure
    pub fn generation<E>(certificate_type: CertificateType, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Generation { certificate_type, source: source.into() }
    }

    /// Create an unresolved race error
    pub fn unresolved_race<K: Into<String>>(key: K, reason: RaceFailure) -> Self {
        Self::UnresolvedRace { key: key.into(), reason }
    }

    /// Describe `error` for callers that waited on the resolution that produced it
    pub fn joined_failure<K: Into<String>>(key: K, error: &CertKeeperError) -> Self {
        match error {
            CertKeeperError::JoinedFailure { message, retryable, .. } => Self::JoinedFailure {
                key: key.into(),
                message: message.clone(),
                retryable: *retryable,
            },
            other => Self::JoinedFailure {
                key: key.into(),
                message: other.to_string(),
                retryable: other.is_retryable(),
            },
        }
    }

    /// Create a corrupt record error
    pub fn corrupt_record<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::CorruptRecord { key: key.into(), message: message.into() }
    }

    /// Create a credential error
    pub fn credential<S: Into<String>>(message: S) -> Self {
        Self::Credential { message: message.into(), source: None }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Add context to an error
    pub(crate) fn add_context(&mut self, context: &str) {
        match self {
            CertKeeperError::Io { context: ref mut ctx, .. }
            | CertKeeperError::StoreUnavailable { context: ref mut ctx, .. } => {
                *ctx = format!("{}: {}", context, ctx);
            }
            _ => {}
        }
    }

    /// Whether a later call may succeed without operator intervention.
    ///
    /// Generation failures and unresolved races are surfaced for a human to
    /// look at; the key manager never retries them on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CertKeeperError::StoreUnavailable { .. }
                | CertKeeperError::Io { .. }
                | CertKeeperError::JoinedFailure { retryable: true, .. }
        )
    }

    /// Whether this is the named fatal outcome of a lost write race
    pub fn is_unresolved_race(&self) -> bool {
        matches!(self, CertKeeperError::UnresolvedRace { .. })
    }
}

/// Attach context to fallible store/io operations
pub trait ErrorContext<T> {
    fn context(self, context: &str) -> Result<T>;
}

impl<T> ErrorContext<T> for Result<T> {
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|mut e| {
            e.add_context(context);
            e
        })
    }
}

// Error conversions for common external error types
impl From<sqlx::Error> for CertKeeperError {
    fn from(error: sqlx::Error) -> Self {
        Self::StoreUnavailable { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<sqlx::migrate::MigrateError> for CertKeeperError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::StoreUnavailable {
            source: sqlx::Error::Migrate(Box::new(error)),
            context: "Database migration failed".to_string(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for CertKeeperError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        Self::Credential { message: error.to_string(), source: Some(error) }
    }
}

impl From<std::io::Error> for CertKeeperError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<validator::ValidationErrors> for CertKeeperError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages = Vec::new();
        collect_validation_messages(&errors, "", &mut messages);
        messages.sort();

        Self::validation(format!("Validation failed: {}", messages.join("; ")))
    }
}

// Nested structs report their fields as `parent.field`.
fn collect_validation_messages(
    errors: &validator::ValidationErrors,
    prefix: &str,
    messages: &mut Vec<String>,
) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path =
            if prefix.is_empty() { field.to_string() } else { format!("{}.{}", prefix, field) };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                messages.push(format!("{}: {}", path, error_messages.join(", ")));
            }
            ValidationErrorsKind::Struct(nested) => {
                collect_validation_messages(nested, &path, messages);
            }
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_validation_messages(nested, &format!("{}[{}]", path, index), messages);
                }
            }
        }
    }
}
