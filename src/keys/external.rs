//! Pre-provisioned certificates loaded from disk.
//!
//! Operators can hand every instance the same certificate and PKCS#8 key
//! instead of letting the instances mint one. The pair is validated once at
//! load time; the key manager re-checks expiry on every request.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use rcgen::KeyPair;
use rustls::pki_types::{pem::PemObject, CertificateDer, PrivatePkcs8KeyDer};
use x509_parser::parse_x509_certificate;
use zeroize::Zeroizing;

use crate::errors::{Result, ProvisioningError};
use crate::keys::{Certificate, CertificateKey, CertificateRecord, ConcurrencyToken};

/// Metadata of the leaf certificate, for logging and expiry checks.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// A validated certificate/key pair read from disk.
pub struct ExternalCertificate {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub info: CertificateInfo,
    certificate_pem: String,
    private_key_pem: Zeroizing<String>,
}

impl ExternalCertificate {
    pub fn not_after(&self) -> DateTime<Utc> {
        self.info.not_after
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.info.not_after > now
    }

    /// Build the parsed certificate served under `key`.
    pub fn certificate(&self, key: CertificateKey) -> Result<Certificate> {
        Certificate::from_pem(key, &self.certificate_pem, &self.private_key_pem)
    }

    /// Same material in the stored-record shape.
    pub fn to_record(&self, key: CertificateKey) -> CertificateRecord {
        let bundle = Zeroizing::new(format!("{}{}", self.certificate_pem, *self.private_key_pem));
        CertificateRecord {
            key,
            certificate_base64: BASE64_STANDARD.encode(bundle.as_bytes()),
            expiration_date: self.info.not_after,
            concurrency_token: ConcurrencyToken::new(),
        }
    }
}

impl std::fmt::Debug for ExternalCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalCertificate")
            .field("cert_path", &self.cert_path)
            .field("key_path", &self.key_path)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Load and validate a certificate and its PKCS#8 private key.
///
/// The first certificate in `cert_path` is the leaf. It must be valid at
/// `now` and its public key must match the private key.
pub fn load_external_certificate(
    cert_path: &Path,
    key_path: &Path,
    now: DateTime<Utc>,
) -> std::result::Result<ExternalCertificate, ProvisioningError> {
    let cert_bytes = fs::read(cert_path)
        .map_err(|source| ProvisioningError::ReadCertificate {
            path: cert_path.to_path_buf(),
            source,
        })?;

    let chain: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(&cert_bytes)
        .map(|result| {
            result.map_err(|err| ProvisioningError::MalformedCertificate {
                path: cert_path.to_path_buf(),
                source: anyhow!(err),
            })
        })
        .collect::<std::result::Result<_, _>>()?;

    let leaf = chain
        .into_iter()
        .next()
        .ok_or_else(|| ProvisioningError::NoCertificate { path: cert_path.to_path_buf() })?;

    let certificate_pem = String::from_utf8(cert_bytes).map_err(|err| {
        ProvisioningError::MalformedCertificate {
            path: cert_path.to_path_buf(),
            source: anyhow!(err),
        }
    })?;

    let key_bytes = Zeroizing::new(
        fs::read(key_path).map_err(|e| ProvisioningError::ReadPrivateKey {
            path: key_path.to_path_buf(),
            source: e,
        })?,
    );

    let private_key = PrivatePkcs8KeyDer::from_pem_slice(&key_bytes).map_err(|err| {
        unsupported_key(key_path, anyhow!(err))
    })?;

    let (info, public_key) = parse_leaf(&leaf, cert_path)?;
    validate_certificate_dates(&info, cert_path, now)?;
    validate_key_pair(&public_key, &private_key, key_path)?;

    let private_key_pem = Zeroizing::new(String::from_utf8(key_bytes.to_vec()).map_err(|err| {
        unsupported_key(key_path, anyhow!(err))
    })?);

    tracing::info!(
        cert_path = %cert_path.display(),
        subject = %info.subject,
        not_after = %info.not_after,
        "Loaded pre-provisioned certificate"
    );

    Ok(ExternalCertificate {
        cert_path: cert_path.to_path_buf(),
        key_path: key_path.to_path_buf(),
        info,
        certificate_pem,
        private_key_pem,
    })
}

fn parse_leaf(
    leaf: &CertificateDer<'static>,
    path: &Path,
) -> std::result::Result<(CertificateInfo, Vec<u8>), ProvisioningError> {
    let metadata_error =
        |source| ProvisioningError::UnreadableMetadata { path: path.to_path_buf(), source };

    let (_, x509) = parse_x509_certificate(leaf.as_ref()).map_err(|e| metadata_error(anyhow!(e)))?;

    let not_before = DateTime::from_timestamp(x509.validity().not_before.timestamp(), 0)
        .ok_or_else(|| metadata_error(anyhow!("NotBefore out of range")))?;
    let not_after = DateTime::from_timestamp(x509.validity().not_after.timestamp(), 0)
        .ok_or_else(|| metadata_error(anyhow!("NotAfter out of range")))?;

    let info = CertificateInfo {
        subject: x509.subject().to_string(),
        issuer: x509.issuer().to_string(),
        not_before,
        not_after,
    };
    let public_key = x509.public_key().subject_public_key.data.to_vec();

    Ok((info, public_key))
}

fn unsupported_key(key_path: &Path, source: anyhow::Error) -> ProvisioningError {
    ProvisioningError::UnsupportedPrivateKey { path: key_path.to_path_buf(), source: Some(source) }
}

fn validate_certificate_dates(
    info: &CertificateInfo,
    path: &Path,
    now: DateTime<Utc>,
) -> std::result::Result<(), ProvisioningError> {
    if info.not_before > now {
        return Err(ProvisioningError::NotYetValid {
            path: path.to_path_buf(),
            not_before: info.not_before,
        });
    }
    if info.not_after <= now {
        return Err(ProvisioningError::Expired {
            path: path.to_path_buf(),
            not_after: info.not_after,
        });
    }
    Ok(())
}

fn validate_key_pair(
    public_key: &[u8],
    private_key: &PrivatePkcs8KeyDer<'_>,
    key_path: &Path,
) -> std::result::Result<(), ProvisioningError> {
    let key_pair = KeyPair::try_from(private_key.secret_pkcs8_der()).map_err(|err| {
        unsupported_key(key_path, anyhow!(err))
    })?;

    // Tokens are signed ES256; other key types cannot back a credential.
    if key_pair.algorithm() != &rcgen::PKCS_ECDSA_P256_SHA256 {
        return Err(ProvisioningError::UnsupportedPrivateKey {
            path: key_path.to_path_buf(),
            source: Some(anyhow!("only ECDSA P-256 keys are supported")),
        });
    }

    if key_pair.public_key_raw() != public_key {
        return Err(ProvisioningError::KeyMismatch);
    }

    Ok(())
}
