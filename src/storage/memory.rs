//! Process-local certificate store for single-instance development and tests.
//!
//! Follows the same optimistic write rules as the SQL store, so a key
//! manager behaves identically against either.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::Result;
use crate::keys::{CertificateKey, CertificateRecord, ConcurrencyToken};
use crate::storage::repositories::certificate::ensure_same_key;
use crate::storage::{CertificateStore, InsertOutcome, ReplaceOutcome};

/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCertificateStore {
    records: Arc<RwLock<HashMap<CertificateKey, CertificateRecord>>>,
}

impl InMemoryCertificateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CertificateStore for InMemoryCertificateStore {
    async fn fetch(&self, key: &CertificateKey) -> Result<Option<CertificateRecord>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn insert(&self, record: CertificateRecord) -> Result<InsertOutcome> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.key) {
            return Ok(InsertOutcome::Conflict);
        }
        records.insert(record.key.clone(), record.clone());
        Ok(InsertOutcome::Inserted(record))
    }

    async fn replace_if_unchanged(
        &self,
        key: &CertificateKey,
        expected_token: &ConcurrencyToken,
        replacement: CertificateRecord,
    ) -> Result<ReplaceOutcome> {
        ensure_same_key(key, &replacement)?;

        let mut records = self.records.write().await;
        match records.get_mut(key) {
            Some(current) if &current.concurrency_token == expected_token => {
                *current = replacement.clone();
                Ok(ReplaceOutcome::Replaced(replacement))
            }
            _ => Ok(ReplaceOutcome::Conflict),
        }
    }
}
