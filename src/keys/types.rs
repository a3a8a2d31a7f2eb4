//! Domain types shared by the generator, store, cache and key manager.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{CertKeeperError, Result};

/// Purpose of a token certificate. Decides the key-usage extension embedded
/// at generation time and the credential kind the adapter produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificateType {
    Signing,
    Encryption,
}

impl CertificateType {
    pub const ALL: [CertificateType; 2] = [CertificateType::Signing, CertificateType::Encryption];

    /// Name used as the store key suffix.
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateType::Signing => "Signing",
            CertificateType::Encryption => "Encryption",
        }
    }
}

impl fmt::Display for CertificateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateType {
    type Err = CertKeeperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "signing" => Ok(CertificateType::Signing),
            "encryption" => Ok(CertificateType::Encryption),
            other => Err(CertKeeperError::validation_field(
                format!("Unknown certificate type '{}'", other),
                "certificate_type",
            )),
        }
    }
}

/// Store key of the form `{issuerHost}+{certificateType}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateKey(String);

impl CertificateKey {
    pub fn new(issuer_host: &str, certificate_type: CertificateType) -> Self {
        Self(format!("{}+{}", issuer_host, certificate_type.as_str()))
    }

    /// Wrap a key read back from storage.
    pub fn from_string(key: String) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertificateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Version marker compared on write to reject lost updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcurrencyToken(String);

impl ConcurrencyToken {
    /// Mint a fresh random token.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(token: String) -> Self {
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConcurrencyToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A certificate row as persisted in the shared store.
///
/// `certificate_base64` is base64 over a PEM bundle: the certificate
/// followed by its PKCS#8 private key. `expiration_date` equals the
/// certificate's `NotAfter`.
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub key: CertificateKey,
    pub certificate_base64: String,
    pub expiration_date: DateTime<Utc>,
    pub concurrency_token: ConcurrencyToken,
}

impl CertificateRecord {
    /// Build a record with a freshly minted concurrency token.
    pub fn new(
        key: CertificateKey,
        certificate_base64: String,
        expiration_date: DateTime<Utc>,
    ) -> Self {
        let concurrency_token = ConcurrencyToken::new();
        Self { key, certificate_base64, expiration_date, concurrency_token }
    }

    /// A record is valid strictly before its expiration; `expiration == now` is expired.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date > now
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_valid_at(now)
    }
}

// The blob carries a private key; keep it out of logs.
impl fmt::Debug for CertificateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateRecord")
            .field("key", &self.key)
            .field("certificate_base64", &format_args!("<{} bytes>", self.certificate_base64.len()))
            .field("expiration_date", &self.expiration_date)
            .field("concurrency_token", &self.concurrency_token)
            .finish()
    }
}
