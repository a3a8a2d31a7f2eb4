//! Failures of an operator-supplied certificate.
//!
//! These are raised at startup while loading the files, and again on
//! request once the loaded certificate runs out.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Only one of the certificate and private key paths is set.
    #[error("Pre-provisioned certificate needs both a certificate and a private key path")]
    IncompleteConfiguration,

    #[error("Cannot read pre-provisioned certificate {path}: {source}")]
    ReadCertificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read pre-provisioned private key {path}: {source}")]
    ReadPrivateKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} holds no PEM certificate")]
    NoCertificate { path: PathBuf },

    #[error("{path} is not a well-formed certificate PEM: {source}")]
    MalformedCertificate {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Not PKCS#8, or not an ECDSA P-256 key.
    #[error("{path} is not a PKCS#8 ECDSA P-256 private key")]
    UnsupportedPrivateKey {
        path: PathBuf,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Pre-provisioned certificate and private key belong to different key pairs")]
    KeyMismatch,

    #[error("Pre-provisioned certificate {path} only becomes valid at {not_before}")]
    NotYetValid { path: PathBuf, not_before: DateTime<Utc> },

    #[error("Pre-provisioned certificate {path} expired at {not_after}")]
    Expired { path: PathBuf, not_after: DateTime<Utc> },

    #[error("Cannot read validity of {path}: {source}")]
    UnreadableMetadata {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}
