//! Issuer certificate repository.
//!
//! Every instance reads and writes the same `issuer_certificates` table.
//! Writes are optimistic: inserts lose to an existing row and replacements
//! lose when the stored concurrency token has moved on. Losing is reported
//! as an outcome, not an error.

use crate::errors::{CertKeeperError, Result};
use crate::keys::{CertificateKey, CertificateRecord, ConcurrencyToken};
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use sqlx::FromRow;
use tracing::instrument;

/// Parse a timestamp string that may be in RFC 3339 format (from application)
/// or SQLite datetime format (rows written by hand).
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    Err(CertKeeperError::validation(format!("Invalid timestamp format: {}", s)))
}

fn format_timestamp(moment: &DateTime<Utc>) -> String {
    moment.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of an insert-if-absent write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record is now current for its key.
    Inserted(CertificateRecord),
    /// Another writer already holds the key.
    Conflict,
}

/// Result of a compare-and-swap replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The replacement is now current for its key.
    Replaced(CertificateRecord),
    /// The stored token no longer matched, or the row is gone.
    Conflict,
}

// ============================================================================
// Database Row Type
// ============================================================================

#[derive(Debug, Clone, FromRow)]
struct CertificateRow {
    id: String,
    certificate_base64: String,
    expiration_date: String,
    concurrency_token: String,
}

impl TryFrom<CertificateRow> for CertificateRecord {
    type Error = CertKeeperError;

    fn try_from(row: CertificateRow) -> Result<Self> {
        let expiration_date = parse_timestamp(&row.expiration_date).map_err(|e| {
            CertKeeperError::corrupt_record(row.id.as_str(), format!("bad expiration_date: {}", e))
        })?;

        Ok(CertificateRecord {
            key: CertificateKey::from_string(row.id),
            certificate_base64: row.certificate_base64,
            expiration_date,
            concurrency_token: ConcurrencyToken::from_string(row.concurrency_token),
        })
    }
}

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Current record for a key, if any.
    async fn fetch(&self, key: &CertificateKey) -> Result<Option<CertificateRecord>>;

    /// Insert a record unless one already exists for its key.
    async fn insert(&self, record: CertificateRecord) -> Result<InsertOutcome>;

    /// Replace the record for `key` only if its token still equals `expected_token`.
    async fn replace_if_unchanged(
        &self,
        key: &CertificateKey,
        expected_token: &ConcurrencyToken,
        replacement: CertificateRecord,
    ) -> Result<ReplaceOutcome>;
}

pub(crate) fn ensure_same_key(key: &CertificateKey, replacement: &CertificateRecord) -> Result<()> {
    if &replacement.key != key {
        return Err(CertKeeperError::validation_field(
            format!("Replacement for '{}' carries key '{}'", key, replacement.key),
            "key",
        ));
    }
    Ok(())
}

// ============================================================================
// SQLx Implementation
// ============================================================================

#[derive(Debug, Clone)]
pub struct SqlxCertificateStore {
    pool: DbPool,
}

impl SqlxCertificateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CertificateStore for SqlxCertificateStore {
    #[instrument(skip(self), fields(key = %key), name = "db_fetch_certificate")]
    async fn fetch(&self, key: &CertificateKey) -> Result<Option<CertificateRecord>> {
        let row = sqlx::query_as::<_, CertificateRow>(
            "SELECT id, certificate_base64, expiration_date, concurrency_token \
             FROM issuer_certificates WHERE id = $1",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CertKeeperError::store(e, format!("Failed to fetch certificate: {}", key)))?;

        row.map(|r| r.try_into()).transpose()
    }

    #[instrument(skip(self, record), fields(key = %record.key), name = "db_insert_certificate")]
    async fn insert(&self, record: CertificateRecord) -> Result<InsertOutcome> {
        let result = sqlx::query(
            "INSERT INTO issuer_certificates (id, certificate_base64, expiration_date, concurrency_token) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(record.key.as_str())
        .bind(record.certificate_base64.as_str())
        .bind(format_timestamp(&record.expiration_date))
        .bind(record.concurrency_token.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            CertKeeperError::store(e, format!("Failed to insert certificate: {}", record.key))
        })?;

        if result.rows_affected() == 0 {
            tracing::debug!(key = %record.key, "Insert lost to an existing certificate");
            return Ok(InsertOutcome::Conflict);
        }

        Ok(InsertOutcome::Inserted(record))
    }

    #[instrument(
        skip(self, replacement),
        fields(key = %key, expected_token = %expected_token),
        name = "db_replace_certificate"
    )]
    async fn replace_if_unchanged(
        &self,
        key: &CertificateKey,
        expected_token: &ConcurrencyToken,
        replacement: CertificateRecord,
    ) -> Result<ReplaceOutcome> {
        ensure_same_key(key, &replacement)?;

        let result = sqlx::query(
            "UPDATE issuer_certificates \
             SET certificate_base64 = $1, expiration_date = $2, concurrency_token = $3 \
             WHERE id = $4 AND concurrency_token = $5",
        )
        .bind(replacement.certificate_base64.as_str())
        .bind(format_timestamp(&replacement.expiration_date))
        .bind(replacement.concurrency_token.as_str())
        .bind(key.as_str())
        .bind(expected_token.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| CertKeeperError::store(e, format!("Failed to replace certificate: {}", key)))?;

        if result.rows_affected() == 0 {
            tracing::debug!(key = %key, "Replacement lost to a concurrent writer");
            return Ok(ReplaceOutcome::Conflict);
        }

        Ok(ReplaceOutcome::Replaced(replacement))
    }
}
