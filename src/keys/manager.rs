//! Certificate lifecycle orchestration.
//!
//! [`KeyManager::get`] is the only entry point the token pipeline needs. It
//! serves from the per-process cache when it can, and otherwise reconciles
//! with the shared store: adopt a valid record, or generate one and race the
//! other instances to persist it. The store's concurrency token decides the
//! race; losers adopt whatever won.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};

use crate::config::IssuerConfig;
use crate::errors::{CertKeeperError, ProvisioningError, RaceFailure, Result};
use crate::keys::cache::InMemoryCertificateCache;
use crate::keys::external::{load_external_certificate, ExternalCertificate};
use crate::keys::{
    Certificate, CertificateGenerator, CertificateKey, CertificateRecord, CertificateType, Clock,
    SelfSignedGenerator, SystemClock,
};
use crate::observability::MetricsRecorder;
use crate::storage::{CertificateStore, InsertOutcome, ReplaceOutcome};

/// Operator-supplied certificate served for every type.
struct Preprovisioned {
    cert_path: PathBuf,
    certificates: HashMap<CertificateType, Certificate>,
}

pub struct KeyManager {
    issuer_host: String,
    validity_days: u32,
    store: Arc<dyn CertificateStore>,
    generator: Arc<dyn CertificateGenerator>,
    clock: Arc<dyn Clock>,
    cache: InMemoryCertificateCache,
    preprovisioned: Option<Preprovisioned>,
    metrics: MetricsRecorder,
}

impl KeyManager {
    pub fn new(
        issuer_host: impl Into<String>,
        validity_days: u32,
        store: Arc<dyn CertificateStore>,
        generator: Arc<dyn CertificateGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let issuer_host = issuer_host.into();
        if issuer_host.trim().is_empty() {
            return Err(CertKeeperError::validation_field(
                "Issuer host cannot be empty",
                "issuer_host",
            ));
        }
        if validity_days == 0 {
            return Err(CertKeeperError::validation_field(
                "Certificate validity must be at least one day",
                "certificate_expiration_days",
            ));
        }

        Ok(Self {
            issuer_host,
            validity_days,
            store,
            generator,
            cache: InMemoryCertificateCache::new(Arc::clone(&clock)),
            clock,
            preprovisioned: None,
            metrics: MetricsRecorder::new(),
        })
    }

    /// Wire a manager from configuration with the wall clock and the rcgen generator.
    ///
    /// When a pre-provisioned certificate is configured it is loaded and
    /// validated here, and served for both certificate types.
    pub fn from_config(config: &IssuerConfig, store: Arc<dyn CertificateStore>) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let manager = Self::new(
            config.issuer_host()?,
            config.certificate_expiration_days,
            store,
            Arc::new(SelfSignedGenerator::new()),
            Arc::clone(&clock),
        )?;

        match &config.certificate {
            Some(files) => {
                let external =
                    load_external_certificate(&files.cert_path, &files.key_path, clock.now())?;
                manager.with_preprovisioned(&external)
            }
            None => Ok(manager),
        }
    }

    /// Serve `external` for both types instead of generating.
    pub fn with_preprovisioned(mut self, external: &ExternalCertificate) -> Result<Self> {
        let mut certificates = HashMap::new();
        for certificate_type in CertificateType::ALL {
            let certificate = external.certificate(self.key_for(certificate_type))?;
            certificates.insert(certificate_type, certificate);
        }
        self.preprovisioned =
            Some(Preprovisioned { cert_path: external.cert_path.clone(), certificates });
        Ok(self)
    }

    pub fn issuer_host(&self) -> &str {
        &self.issuer_host
    }

    pub fn validity_days(&self) -> u32 {
        self.validity_days
    }

    pub fn key_for(&self, certificate_type: CertificateType) -> CertificateKey {
        CertificateKey::new(&self.issuer_host, certificate_type)
    }

    pub fn cache(&self) -> &InMemoryCertificateCache {
        &self.cache
    }

    /// A certificate of `certificate_type` that is valid at the clock's now.
    #[instrument(
        skip(self),
        fields(issuer_host = %self.issuer_host, certificate_type = %certificate_type),
        name = "key_manager_get"
    )]
    pub async fn get(&self, certificate_type: CertificateType) -> Result<Certificate> {
        if let Some(preprovisioned) = &self.preprovisioned {
            return self.serve_preprovisioned(preprovisioned, certificate_type);
        }

        let key = self.key_for(certificate_type);
        self.cache.get_or_create(&key, || self.resolve(&key, certificate_type)).await
    }

    /// Current stored record for `certificate_type`, bypassing the cache.
    pub async fn stored_record(
        &self,
        certificate_type: CertificateType,
    ) -> Result<Option<CertificateRecord>> {
        self.store.fetch(&self.key_for(certificate_type)).await
    }

    /// Resolve both certificate types, logging and skipping failures.
    ///
    /// Returns the types that are ready to use.
    pub async fn warm_up(&self) -> Vec<CertificateType> {
        let mut ready = Vec::new();
        for certificate_type in CertificateType::ALL {
            match self.get(certificate_type).await {
                Ok(certificate) => {
                    info!(
                        certificate_type = %certificate_type,
                        not_after = %certificate.not_after(),
                        thumbprint = %certificate.thumbprint(),
                        "Certificate ready"
                    );
                    ready.push(certificate_type);
                }
                Err(e) => {
                    error!(
                        certificate_type = %certificate_type,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Certificate unavailable; continuing without it"
                    );
                }
            }
        }
        ready
    }

    fn serve_preprovisioned(
        &self,
        preprovisioned: &Preprovisioned,
        certificate_type: CertificateType,
    ) -> Result<Certificate> {
        let certificate = preprovisioned.certificates.get(&certificate_type).ok_or_else(|| {
            CertKeeperError::internal(format!(
                "No pre-provisioned {} certificate",
                certificate_type
            ))
        })?;

        if !certificate.is_valid_at(self.clock.now()) {
            error!(
                cert_path = %preprovisioned.cert_path.display(),
                not_after = %certificate.not_after(),
                "Pre-provisioned certificate expired"
            );
            return Err(ProvisioningError::Expired {
                path: preprovisioned.cert_path.clone(),
                not_after: certificate.not_after(),
            }
            .into());
        }

        Ok(certificate.clone())
    }

    async fn resolve(
        &self,
        key: &CertificateKey,
        certificate_type: CertificateType,
    ) -> Result<Certificate> {
        let now = self.clock.now();

        let record = match self.store.fetch(key).await? {
            None => {
                debug!(key = %key, "No stored certificate; generating");
                let candidate = self.generate(certificate_type).await?;
                match self.store.insert(candidate).await? {
                    InsertOutcome::Inserted(record) => {
                        info!(
                            key = %key,
                            expiration_date = %record.expiration_date,
                            "Stored new certificate"
                        );
                        self.metrics
                            .record_certificate_generated(certificate_type.as_str(), "inserted");
                        record
                    }
                    InsertOutcome::Conflict => {
                        self.metrics.record_store_conflict(certificate_type.as_str(), "insert");
                        self.adopt_winner(key).await?
                    }
                }
            }
            Some(current) if current.is_valid_at(now) => current,
            Some(expired) => {
                info!(
                    key = %key,
                    expiration_date = %expired.expiration_date,
                    "Stored certificate expired; replacing"
                );
                let replacement = self.generate(certificate_type).await?;
                match self
                    .store
                    .replace_if_unchanged(key, &expired.concurrency_token, replacement)
                    .await?
                {
                    ReplaceOutcome::Replaced(record) => {
                        info!(
                            key = %key,
                            expiration_date = %record.expiration_date,
                            "Replaced expired certificate"
                        );
                        self.metrics
                            .record_certificate_generated(certificate_type.as_str(), "replaced");
                        record
                    }
                    ReplaceOutcome::Conflict => {
                        self.metrics.record_store_conflict(certificate_type.as_str(), "replace");
                        self.adopt_winner(key).await?
                    }
                }
            }
        };

        // Same now as the record check above.
        let certificate = Certificate::from_record(&record)?;
        if !certificate.is_valid_at(now) {
            return Err(CertKeeperError::corrupt_record(
                key.as_str(),
                format!(
                    "certificate expired at {} but record expires at {}",
                    certificate.not_after(),
                    record.expiration_date
                ),
            ));
        }

        Ok(certificate)
    }

    /// Re-read after a lost write. The winner's record must be present and valid.
    async fn adopt_winner(&self, key: &CertificateKey) -> Result<CertificateRecord> {
        match self.store.fetch(key).await? {
            Some(winner) if winner.is_valid_at(self.clock.now()) => {
                debug!(key = %key, "Adopting certificate written by a concurrent instance");
                Ok(winner)
            }
            Some(winner) => {
                warn!(
                    key = %key,
                    expiration_date = %winner.expiration_date,
                    "Winning certificate already expired"
                );
                Err(CertKeeperError::unresolved_race(key.as_str(), RaceFailure::WinnerExpired))
            }
            None => {
                warn!(key = %key, "Winning certificate disappeared");
                Err(CertKeeperError::unresolved_race(key.as_str(), RaceFailure::WinnerMissing))
            }
        }
    }

    async fn generate(&self, certificate_type: CertificateType) -> Result<CertificateRecord> {
        let generator = Arc::clone(&self.generator);
        let issuer_host = self.issuer_host.clone();
        let validity_days = self.validity_days;
        let now = self.clock.now();

        let started = Instant::now();
        let record = tokio::task::spawn_blocking(move || {
            generator.generate(&issuer_host, certificate_type, validity_days, now)
        })
        .await
        .map_err(|e| CertKeeperError::generation(certificate_type, e))??;

        self.metrics
            .record_generation_duration(certificate_type.as_str(), started.elapsed().as_secs_f64());
        Ok(record)
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("issuer_host", &self.issuer_host)
            .field("validity_days", &self.validity_days)
            .field("clock", &self.clock)
            .field("preprovisioned", &self.preprovisioned.is_some())
            .finish_non_exhaustive()
    }
}
