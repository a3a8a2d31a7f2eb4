//! Store wrappers that observe or script what the key manager sees.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use certkeeper::keys::{CertificateKey, CertificateRecord, ConcurrencyToken};
use certkeeper::storage::{CertificateStore, InsertOutcome, ReplaceOutcome};
use certkeeper::Result;

/// Counts calls into an inner store. Writes can be slowed down so that
/// concurrent callers pile up behind them.
pub struct CountingStore {
    inner: Arc<dyn CertificateStore>,
    write_delay: Duration,
    pub fetches: AtomicUsize,
    pub inserts: AtomicUsize,
    pub replaces: AtomicUsize,
    pub replace_conflicts: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn CertificateStore>) -> Self {
        Self {
            inner,
            write_delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            replaces: AtomicUsize::new(0),
            replace_conflicts: AtomicUsize::new(0),
        }
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn replaces(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }

    pub fn replace_conflicts(&self) -> usize {
        self.replace_conflicts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CertificateStore for CountingStore {
    async fn fetch(&self, key: &CertificateKey) -> Result<Option<CertificateRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(key).await
    }

    async fn insert(&self, record: CertificateRecord) -> Result<InsertOutcome> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        self.inner.insert(record).await
    }

    async fn replace_if_unchanged(
        &self,
        key: &CertificateKey,
        expected_token: &ConcurrencyToken,
        replacement: CertificateRecord,
    ) -> Result<ReplaceOutcome> {
        self.replaces.fetch_add(1, Ordering::SeqCst);
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        let outcome = self.inner.replace_if_unchanged(key, expected_token, replacement).await?;
        if outcome == ReplaceOutcome::Conflict {
            self.replace_conflicts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(outcome)
    }
}

/// Loses every write, then answers re-reads with `winner`.
pub struct LosingStore {
    pub initial: Option<CertificateRecord>,
    pub winner: Option<CertificateRecord>,
    fetches: AtomicUsize,
}

impl LosingStore {
    pub fn new(initial: Option<CertificateRecord>, winner: Option<CertificateRecord>) -> Self {
        Self { initial, winner, fetches: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl CertificateStore for LosingStore {
    async fn fetch(&self, _key: &CertificateKey) -> Result<Option<CertificateRecord>> {
        if self.fetches.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(self.initial.clone())
        } else {
            Ok(self.winner.clone())
        }
    }

    async fn insert(&self, _record: CertificateRecord) -> Result<InsertOutcome> {
        Ok(InsertOutcome::Conflict)
    }

    async fn replace_if_unchanged(
        &self,
        _key: &CertificateKey,
        _expected_token: &ConcurrencyToken,
        _replacement: CertificateRecord,
    ) -> Result<ReplaceOutcome> {
        Ok(ReplaceOutcome::Conflict)
    }
}
