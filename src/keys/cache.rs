//! Per-process certificate cache with single-flight population.
//!
//! Each key owns an async mutex. The first caller for a cold or expired key
//! runs the factory while holding it; everyone else queued on the same key
//! wakes up to that run's outcome instead of running their own. A failed run
//! is reported to the callers that waited on it and then forgotten.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::{CertKeeperError, Result};
use crate::keys::{Certificate, CertificateKey, Clock};
use crate::observability::MetricsRecorder;

/// A parsed certificate held by one process.
#[derive(Debug, Clone)]
pub struct CachedCertificate {
    pub key: CertificateKey,
    pub certificate: Certificate,
    pub expiration_date: DateTime<Utc>,
}

impl CachedCertificate {
    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date > now
    }
}

#[derive(Debug, Default)]
struct SlotState {
    cached: Option<CachedCertificate>,
    /// Outcome of the latest run when it failed, for callers queued behind it.
    last_failure: Option<CertKeeperError>,
}

#[derive(Debug, Default)]
struct Slot {
    state: Mutex<SlotState>,
    /// Factory runs finished on this slot. Only written under `state`.
    completed_runs: AtomicU64,
}

pub struct InMemoryCertificateCache {
    slots: DashMap<CertificateKey, Arc<Slot>>,
    clock: Arc<dyn Clock>,
    metrics: MetricsRecorder,
}

impl InMemoryCertificateCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { slots: DashMap::new(), clock, metrics: MetricsRecorder::new() }
    }

    /// Return the cached certificate for `key`, or run `factory` to produce one.
    ///
    /// At most one factory runs per key at a time, and callers that queued
    /// while it ran share its outcome. Entries whose expiration is at or before
    /// the clock's now are dropped before use. A factory error is handed to the
    /// callers of that run only; the next caller to arrive runs the factory
    /// again. A certificate the factory returns already expired is handed back
    /// but not cached.
    pub async fn get_or_create<F, Fut>(
        &self,
        key: &CertificateKey,
        factory: F,
    ) -> Result<Certificate>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Certificate>>,
    {
        // Clone the slot out so no map shard lock is held across the await below.
        let slot: Arc<Slot> = Arc::clone(&self.slots.entry(key.clone()).or_default());
        let joined_at = slot.completed_runs.load(Ordering::SeqCst);
        let mut state = slot.state.lock().await;

        if let Some(cached) = state.cached.as_ref() {
            if cached.is_valid_at(self.clock.now()) {
                self.metrics.record_cache_lookup(key.as_str(), true);
                return Ok(cached.certificate.clone());
            }
            debug!(
                key = %key,
                expiration_date = %cached.expiration_date,
                "Cached certificate expired"
            );
            state.cached = None;
        }

        if slot.completed_runs.load(Ordering::SeqCst) != joined_at {
            if let Some(failure) = state.last_failure.as_ref() {
                debug!(key = %key, error = %failure, "Sharing failed resolution with waiter");
                return Err(CertKeeperError::joined_failure(key.as_str(), failure));
            }
        }

        self.metrics.record_cache_lookup(key.as_str(), false);
        let outcome = factory().await;
        slot.completed_runs.fetch_add(1, Ordering::SeqCst);

        let certificate = match outcome {
            Ok(certificate) => certificate,
            Err(e) => {
                state.last_failure = Some(CertKeeperError::joined_failure(key.as_str(), &e));
                return Err(e);
            }
        };
        state.last_failure = None;

        let cached = CachedCertificate {
            key: key.clone(),
            expiration_date: certificate.not_after(),
            certificate: certificate.clone(),
        };
        if cached.is_valid_at(self.clock.now()) {
            debug!(key = %key, expiration_date = %cached.expiration_date, "Caching certificate");
            state.cached = Some(cached);
        }

        Ok(certificate)
    }

    /// Peek at a valid cached entry without populating.
    pub async fn get(&self, key: &CertificateKey) -> Option<CachedCertificate> {
        let slot = self.slots.get(key).map(|slot| Arc::clone(&slot))?;
        let state = slot.state.lock().await;
        state.cached.as_ref().filter(|cached| cached.is_valid_at(self.clock.now())).cloned()
    }

    /// Forget `key`. A factory already running for it finishes into the detached slot.
    pub fn invalidate(&self, key: &CertificateKey) {
        debug!(key = %key, "Invalidating cached certificate");
        self.slots.remove(key);
    }

    pub fn clear(&self) {
        debug!("Clearing certificate cache");
        self.slots.clear();
    }

    /// Number of keys currently holding a certificate.
    pub async fn len(&self) -> usize {
        let slots: Vec<Arc<Slot>> =
            self.slots.iter().map(|slot| Arc::clone(slot.value())).collect();
        let mut populated = 0;
        for slot in slots {
            if slot.state.lock().await.cached.is_some() {
                populated += 1;
            }
        }
        populated
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl std::fmt::Debug for InMemoryCertificateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCertificateCache")
            .field("keys", &self.slots.len())
            .field("clock", &self.clock)
            .finish()
    }
}
