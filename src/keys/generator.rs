//! Self-signed token certificate generation.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, KeyUsagePurpose};

use crate::errors::{CertKeeperError, Result};
use crate::keys::{CertificateKey, CertificateRecord, CertificateType};

/// Backdating applied to `NotBefore` to tolerate clock skew between instances.
pub const CLOCK_SKEW_TOLERANCE_DAYS: i64 = 1;

/// Produces new certificate records. Implementations must not perform I/O or
/// retry; a crypto-provider failure is returned as-is.
pub trait CertificateGenerator: Send + Sync {
    fn generate(
        &self,
        issuer_host: &str,
        certificate_type: CertificateType,
        validity_days: u32,
        now: DateTime<Utc>,
    ) -> Result<CertificateRecord>;
}

/// ECDSA P-256 self-signed certificates built with rcgen.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfSignedGenerator;

impl SelfSignedGenerator {
    pub fn new() -> Self {
        Self
    }
}

/// Key-usage extension for each certificate purpose.
pub fn key_usages(certificate_type: CertificateType) -> Vec<KeyUsagePurpose> {
    match certificate_type {
        CertificateType::Signing => vec![KeyUsagePurpose::DigitalSignature],
        CertificateType::Encryption => {
            vec![KeyUsagePurpose::KeyEncipherment, KeyUsagePurpose::KeyAgreement]
        }
    }
}

impl CertificateGenerator for SelfSignedGenerator {
    fn generate(
        &self,
        issuer_host: &str,
        certificate_type: CertificateType,
        validity_days: u32,
        now: DateTime<Utc>,
    ) -> Result<CertificateRecord> {
        if validity_days == 0 {
            return Err(CertKeeperError::validation_field(
                "Certificate validity must be at least one day",
                "certificate_expiration_days",
            ));
        }

        // X.509 validity has second precision; keep the stored expiration identical.
        let now = truncate_to_seconds(now)?;
        let not_before = now - Duration::days(CLOCK_SKEW_TOLERANCE_DAYS);
        let not_after = now + Duration::days(i64::from(validity_days));

        let mut distinguished_name = DistinguishedName::new();
        distinguished_name.push(DnType::CommonName, issuer_host);

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name;
        params.not_before = to_offset(not_before)?;
        params.not_after = to_offset(not_after)?;
        params.key_usages = key_usages(certificate_type);

        let key_pair =
            KeyPair::generate().map_err(|e| CertKeeperError::generation(certificate_type, e))?;
        let certificate = params
            .self_signed(&key_pair)
            .map_err(|e| CertKeeperError::generation(certificate_type, e))?;

        let bundle = format!("{}{}", certificate.pem(), key_pair.serialize_pem());

        tracing::debug!(
            issuer_host = %issuer_host,
            certificate_type = %certificate_type,
            not_after = %not_after,
            "Generated self-signed certificate"
        );

        Ok(CertificateRecord::new(
            CertificateKey::new(issuer_host, certificate_type),
            BASE64_STANDARD.encode(bundle),
            not_after,
        ))
    }
}

fn truncate_to_seconds(moment: DateTime<Utc>) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(moment.timestamp(), 0)
        .ok_or_else(|| CertKeeperError::internal(format!("Timestamp out of range: {}", moment)))
}

fn to_offset(moment: DateTime<Utc>) -> Result<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp(moment.timestamp())
        .map_err(|e| CertKeeperError::internal(format!("Timestamp out of range: {}", e)))
}
