//! Token credentials built from managed certificates.
//!
//! The token pipeline never touches certificates directly. It asks the
//! [`CredentialsProvider`] for a signing or encryption credential right
//! before it issues a token, which always goes through
//! [`KeyManager::get`](crate::keys::KeyManager::get) and so never sees an
//! expired certificate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rcgen::KeyPair;
use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::Zeroizing;

use crate::errors::{CertKeeperError, Result};
use crate::keys::{Certificate, CertificateType, KeyManager};

/// JWS algorithm of every signing credential.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::ES256;

/// JWE key-management algorithm advertised for encryption credentials.
pub const ENCRYPTION_ALGORITHM: &str = "ECDH-ES+A256KW";

/// Key id: SHA-256 thumbprint of the certificate followed by the algorithm name.
pub fn key_id(certificate: &Certificate, algorithm: &str) -> String {
    format!("{}{}", certificate.thumbprint(), algorithm)
}

/// Signs tokens with the certificate's ECDSA P-256 key.
pub struct SigningCredential {
    pub key_id: String,
    pub algorithm: Algorithm,
    pub not_after: DateTime<Utc>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SigningCredential {
    pub fn from_certificate(certificate: &Certificate) -> Result<Self> {
        let usage = certificate.key_usage();
        if (usage.key_encipherment || usage.key_agreement) && !usage.digital_signature {
            return Err(CertKeeperError::credential(format!(
                "Certificate '{}' is not usable for signing",
                certificate.key()
            )));
        }

        Ok(Self {
            key_id: key_id(certificate, "ES256"),
            algorithm: SIGNING_ALGORITHM,
            not_after: certificate.not_after(),
            encoding_key: EncodingKey::from_ec_der(certificate.private_key_der()),
            decoding_key: DecodingKey::from_ec_pem(certificate.public_key_pem().as_bytes())?,
        })
    }

    /// JWS header carrying this credential's algorithm and key id.
    pub fn header(&self) -> Header {
        let mut header = Header::new(self.algorithm);
        header.kid = Some(self.key_id.clone());
        header
    }

    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String> {
        Ok(encode(&self.header(), claims, &self.encoding_key)?)
    }

    pub fn validation_key(&self) -> ValidationKey {
        ValidationKey {
            key_id: self.key_id.clone(),
            algorithm: self.algorithm,
            decoding_key: self.decoding_key.clone(),
        }
    }
}

impl std::fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredential")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

/// Key material for encrypting tokens to this issuer.
pub struct EncryptionCredential {
    pub key_id: String,
    pub algorithm: &'static str,
    pub not_after: DateTime<Utc>,
    pub certificate_der: Vec<u8>,
    pub public_key_pem: String,
    private_key_pem: Zeroizing<String>,
}

impl EncryptionCredential {
    pub fn from_certificate(certificate: &Certificate) -> Result<Self> {
        let usage = certificate.key_usage();
        if usage.digital_signature && !(usage.key_encipherment || usage.key_agreement) {
            return Err(CertKeeperError::credential(format!(
                "Certificate '{}' is not usable for encryption",
                certificate.key()
            )));
        }

        let key_pair = KeyPair::try_from(certificate.private_key_der()).map_err(|e| {
            CertKeeperError::credential(format!("Unsupported private key: {}", e))
        })?;

        Ok(Self {
            key_id: key_id(certificate, ENCRYPTION_ALGORITHM),
            algorithm: ENCRYPTION_ALGORITHM,
            not_after: certificate.not_after(),
            certificate_der: certificate.der().as_ref().to_vec(),
            public_key_pem: certificate.public_key_pem().to_string(),
            private_key_pem: Zeroizing::new(key_pair.serialize_pem()),
        })
    }

    /// PKCS#8 PEM of the decryption key.
    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }
}

impl std::fmt::Debug for EncryptionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionCredential")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

/// Public key a token validator checks signatures against.
#[derive(Clone)]
pub struct ValidationKey {
    pub key_id: String,
    pub algorithm: Algorithm,
    pub decoding_key: DecodingKey,
}

impl ValidationKey {
    /// Verify a token signed by the matching credential and return its claims.
    pub fn verify<T: DeserializeOwned>(&self, token: &str, validation: &Validation) -> Result<T> {
        let header = jsonwebtoken::decode_header(token)?;
        if header.kid.as_deref() != Some(self.key_id.as_str()) {
            return Err(CertKeeperError::credential(format!(
                "Token key id {:?} does not match {}",
                header.kid, self.key_id
            )));
        }
        Ok(decode::<T>(token, &self.decoding_key, validation)?.claims)
    }

    /// Default validation for this key's algorithm.
    pub fn validation(&self) -> Validation {
        Validation::new(self.algorithm)
    }
}

impl std::fmt::Debug for ValidationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Hands the token pipeline credentials for the current certificates.
#[derive(Debug, Clone)]
pub struct CredentialsProvider {
    manager: Arc<KeyManager>,
}

impl CredentialsProvider {
    pub fn new(manager: Arc<KeyManager>) -> Self {
        Self { manager }
    }

    pub async fn signing_credentials(&self) -> Result<SigningCredential> {
        let certificate = self.manager.get(CertificateType::Signing).await?;
        SigningCredential::from_certificate(&certificate)
    }

    pub async fn encryption_credentials(&self) -> Result<EncryptionCredential> {
        let certificate = self.manager.get(CertificateType::Encryption).await?;
        EncryptionCredential::from_certificate(&certificate)
    }

    /// Keys that currently validate tokens signed by this issuer.
    pub async fn validation_keys(&self) -> Result<Vec<ValidationKey>> {
        Ok(vec![self.signing_credentials().await?.validation_key()])
    }
}
