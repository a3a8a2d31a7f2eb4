//! Key manager behaviour against an in-process store.

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use certkeeper::errors::RaceFailure;
use certkeeper::keys::{
    Certificate, CertificateGenerator, CertificateKey, CertificateType, Clock, ManualClock,
    SelfSignedGenerator,
};
use certkeeper::storage::{CertificateStore, InMemoryCertificateStore};
use certkeeper::CertKeeperError;
use chrono::Duration;

use common::stores::{CountingStore, LosingStore};
use common::{manager, ISSUER_HOST, VALIDITY_DAYS};

#[tokio::test]
async fn test_concurrent_first_requests_generate_once() {
    let store = Arc::new(
        CountingStore::new(Arc::new(InMemoryCertificateStore::new()))
            .with_write_delay(StdDuration::from_millis(50)),
    );
    let manager = Arc::new(manager(store.clone(), Arc::new(ManualClock::starting_now())));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            manager.get(CertificateType::Signing).await.unwrap()
        }));
    }

    let mut certificates = Vec::new();
    for handle in handles {
        certificates.push(handle.await.unwrap());
    }

    assert_eq!(store.inserts(), 1);
    assert_eq!(store.fetches(), 1);
    assert!(certificates.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn test_repeated_requests_are_served_from_cache() {
    let store = Arc::new(CountingStore::new(Arc::new(InMemoryCertificateStore::new())));
    let manager = manager(store.clone(), Arc::new(ManualClock::starting_now()));

    let first = manager.get(CertificateType::Encryption).await.unwrap();
    let fetches_after_first = store.fetches();

    for _ in 0..10 {
        assert_eq!(manager.get(CertificateType::Encryption).await.unwrap(), first);
    }

    assert_eq!(store.fetches(), fetches_after_first);
    assert_eq!(store.inserts(), 1);
}

#[tokio::test]
async fn test_types_are_managed_independently() {
    let store = Arc::new(InMemoryCertificateStore::new());
    let manager = manager(store.clone(), Arc::new(ManualClock::starting_now()));

    let signing = manager.get(CertificateType::Signing).await.unwrap();
    let encryption = manager.get(CertificateType::Encryption).await.unwrap();

    assert_ne!(signing, encryption);
    assert_eq!(signing.key().as_str(), "auth.example.com+Signing");
    assert_eq!(encryption.key().as_str(), "auth.example.com+Encryption");
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn test_key_usage_matches_certificate_type() {
    let manager =
        manager(Arc::new(InMemoryCertificateStore::new()), Arc::new(ManualClock::starting_now()));

    let signing = manager.get(CertificateType::Signing).await.unwrap().key_usage();
    assert!(signing.digital_signature);
    assert!(!signing.key_encipherment);
    assert!(!signing.key_agreement);

    let encryption = manager.get(CertificateType::Encryption).await.unwrap().key_usage();
    assert!(!encryption.digital_signature);
    assert!(encryption.key_encipherment);
    assert!(encryption.key_agreement);
}

#[tokio::test]
async fn test_expired_certificate_rotates() {
    let store = Arc::new(CountingStore::new(Arc::new(InMemoryCertificateStore::new())));
    let clock = Arc::new(ManualClock::starting_now());
    let manager = manager(store.clone(), clock.clone());

    let a = manager.get(CertificateType::Signing).await.unwrap();
    let a_record = manager.stored_record(CertificateType::Signing).await.unwrap().unwrap();
    assert_eq!(a.not_after(), a_record.expiration_date);

    // One second short of expiry A is still served.
    clock.set(a.not_after() - Duration::seconds(1));
    assert_eq!(manager.get(CertificateType::Signing).await.unwrap(), a);
    assert_eq!(store.replaces(), 0);

    clock.set(a.not_after());
    let b = manager.get(CertificateType::Signing).await.unwrap();
    let b_record = manager.stored_record(CertificateType::Signing).await.unwrap().unwrap();

    assert_ne!(a, b);
    assert!(b.not_after() > a.not_after());
    assert_eq!(b.not_after(), clock.now() + Duration::days(i64::from(VALIDITY_DAYS)));
    assert_ne!(b_record.concurrency_token, a_record.concurrency_token);
    assert_eq!(store.replaces(), 1);
}

#[tokio::test]
async fn test_instances_sharing_a_store_converge() {
    let store: Arc<dyn CertificateStore> = Arc::new(InMemoryCertificateStore::new());
    let clock = Arc::new(ManualClock::starting_now());
    let first = manager(Arc::clone(&store), clock.clone());
    let second = manager(Arc::clone(&store), clock.clone());

    let (a, b) =
        tokio::join!(first.get(CertificateType::Signing), second.get(CertificateType::Signing));
    assert_eq!(a.unwrap(), b.unwrap());

    let a = first.get(CertificateType::Signing).await.unwrap();
    clock.set(a.not_after() + Duration::hours(1));

    let (a2, b2) =
        tokio::join!(first.get(CertificateType::Signing), second.get(CertificateType::Signing));
    let (a2, b2) = (a2.unwrap(), b2.unwrap());
    assert_eq!(a2, b2);
    assert_ne!(a2, a);
}

#[tokio::test]
async fn test_lost_insert_adopts_winner() {
    let clock = Arc::new(ManualClock::starting_now());
    let winner = SelfSignedGenerator::new()
        .generate(ISSUER_HOST, CertificateType::Signing, VALIDITY_DAYS, clock.now())
        .unwrap();
    let store = Arc::new(LosingStore::new(None, Some(winner.clone())));
    let manager = manager(store, clock);

    let certificate = manager.get(CertificateType::Signing).await.unwrap();
    assert_eq!(certificate, Certificate::from_record(&winner).unwrap());
}

#[tokio::test]
async fn test_lost_replace_adopts_winner() {
    let clock = Arc::new(ManualClock::starting_now());
    let generator = SelfSignedGenerator::new();
    let expired = generator
        .generate(ISSUER_HOST, CertificateType::Encryption, 1, clock.now() - Duration::days(3))
        .unwrap();
    let winner = generator
        .generate(ISSUER_HOST, CertificateType::Encryption, VALIDITY_DAYS, clock.now())
        .unwrap();
    let store = Arc::new(LosingStore::new(Some(expired), Some(winner.clone())));
    let manager = manager(store, clock.clone());

    let certificate = manager.get(CertificateType::Encryption).await.unwrap();
    assert_eq!(certificate, Certificate::from_record(&winner).unwrap());
    assert!(certificate.is_valid_at(clock.now()));
}

#[tokio::test]
async fn test_lost_insert_with_missing_winner_is_unresolved() {
    let store = Arc::new(LosingStore::new(None, None));
    let manager = manager(store, Arc::new(ManualClock::starting_now()));

    let err = manager.get(CertificateType::Signing).await.unwrap_err();
    assert!(err.is_unresolved_race());
    assert!(matches!(
        err,
        CertKeeperError::UnresolvedRace { reason: RaceFailure::WinnerMissing, .. }
    ));
}

#[tokio::test]
async fn test_lost_replace_with_expired_winner_is_unresolved() {
    let clock = Arc::new(ManualClock::starting_now());
    let expired = SelfSignedGenerator::new()
        .generate(ISSUER_HOST, CertificateType::Encryption, 1, clock.now() - Duration::days(3))
        .unwrap();
    let store = Arc::new(LosingStore::new(Some(expired.clone()), Some(expired)));
    let manager = manager(store, clock);

    let err = manager.get(CertificateType::Encryption).await.unwrap_err();
    assert!(matches!(
        err,
        CertKeeperError::UnresolvedRace { reason: RaceFailure::WinnerExpired, .. }
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_stored_record_key_format() {
    let store = Arc::new(InMemoryCertificateStore::new());
    let manager = manager(store.clone(), Arc::new(ManualClock::starting_now()));
    manager.get(CertificateType::Encryption).await.unwrap();

    let key = CertificateKey::new(ISSUER_HOST, CertificateType::Encryption);
    let record = store.fetch(&key).await.unwrap().unwrap();
    assert_eq!(record.key.as_str(), "auth.example.com+Encryption");

    let signing = CertificateKey::new(ISSUER_HOST, CertificateType::Signing);
    assert!(store.fetch(&signing).await.unwrap().is_none());
}
