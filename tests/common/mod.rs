//! Common test utilities for all integration tests.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

pub mod stores;
pub mod test_db;

use std::sync::Arc;

use certkeeper::keys::{
    CertificateGenerator, Clock, KeyManager, ManualClock, SelfSignedGenerator,
};
use certkeeper::storage::CertificateStore;

pub const ISSUER_HOST: &str = "auth.example.com";
pub const VALIDITY_DAYS: u32 = 30;

/// A manager with the rcgen generator and a clock the test controls.
pub fn manager(store: Arc<dyn CertificateStore>, clock: Arc<ManualClock>) -> KeyManager {
    manager_with_generator(store, Arc::new(SelfSignedGenerator::new()), clock)
}

pub fn manager_with_generator(
    store: Arc<dyn CertificateStore>,
    generator: Arc<dyn CertificateGenerator>,
    clock: Arc<dyn Clock>,
) -> KeyManager {
    KeyManager::new(ISSUER_HOST, VALIDITY_DAYS, store, generator, clock)
        .unwrap_or_else(|e| panic!("Failed to build key manager: {}", e))
}
