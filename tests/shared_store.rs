//! Several instances, each with its own pool, sharing one SQL database.

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use certkeeper::keys::{CertificateType, Clock, ConcurrencyToken, ManualClock};
use certkeeper::storage::{
    get_migration_version, validate_migrations, CertificateStore, ReplaceOutcome,
    SqlxCertificateStore,
};
use chrono::Duration;
use futures::future::join_all;

use common::manager;
use common::stores::CountingStore;
use common::test_db::TestDatabase;

#[tokio::test]
async fn test_instances_agree_on_first_certificate() {
    let db = TestDatabase::new();
    let clock = Arc::new(ManualClock::starting_now());

    let mut instances = Vec::new();
    for _ in 0..4 {
        let store = Arc::new(SqlxCertificateStore::new(db.connect().await));
        instances.push(manager(store, clock.clone()));
    }

    let results =
        join_all(instances.iter().map(|instance| instance.get(CertificateType::Signing))).await;
    let certificates: Vec<_> = results.into_iter().map(|result| result.unwrap()).collect();
    assert!(certificates.windows(2).all(|pair| pair[0] == pair[1]));

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM issuer_certificates")
        .fetch_one(&db.connect().await)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_instances_agree_on_replacement() {
    let db = TestDatabase::new();
    let start = chrono::Utc::now();

    let seed_clock = Arc::new(ManualClock::new(start));
    let seed = manager(Arc::new(SqlxCertificateStore::new(db.connect().await)), seed_clock);
    let original = seed.get(CertificateType::Encryption).await.unwrap();

    // Delayed writes keep both instances' reads ahead of either replace.
    let expired_at = original.not_after() + Duration::minutes(5);
    let first_store = Arc::new(
        CountingStore::new(Arc::new(SqlxCertificateStore::new(db.connect().await)))
            .with_write_delay(StdDuration::from_millis(200)),
    );
    let second_store = Arc::new(
        CountingStore::new(Arc::new(SqlxCertificateStore::new(db.connect().await)))
            .with_write_delay(StdDuration::from_millis(200)),
    );
    let first = manager(first_store.clone(), Arc::new(ManualClock::new(expired_at)));
    let second = manager(second_store.clone(), Arc::new(ManualClock::new(expired_at)));

    let (a, b) = tokio::join!(
        first.get(CertificateType::Encryption),
        second.get(CertificateType::Encryption)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a, b);
    assert_ne!(a, original);
    assert!(a.not_after() > expired_at);

    assert_eq!(first_store.replaces(), 1);
    assert_eq!(second_store.replaces(), 1);
    assert_eq!(first_store.replace_conflicts() + second_store.replace_conflicts(), 1);
    // The losing instance re-read the winner after its conflict.
    assert_eq!(first_store.fetches() + second_store.fetches(), 3);

    let stored = first.stored_record(CertificateType::Encryption).await.unwrap().unwrap();
    assert_eq!(stored.expiration_date, a.not_after());
}

#[tokio::test]
async fn test_new_instance_adopts_existing_certificate() {
    let db = TestDatabase::new();
    let clock = Arc::new(ManualClock::starting_now());

    let first = manager(Arc::new(SqlxCertificateStore::new(db.connect().await)), clock.clone());
    let issued = first.get(CertificateType::Signing).await.unwrap();

    // Later, a freshly started instance.
    clock.advance(Duration::days(3));
    let store = Arc::new(CountingStore::new(Arc::new(SqlxCertificateStore::new(
        db.connect().await,
    ))));
    let second = manager(store.clone(), clock.clone());

    assert_eq!(second.get(CertificateType::Signing).await.unwrap(), issued);
    assert_eq!(store.inserts(), 0);
    assert_eq!(store.replaces(), 0);
    assert!(issued.is_valid_at(clock.now()));
}

#[tokio::test]
async fn test_stale_replace_is_rejected_by_database() {
    let db = TestDatabase::new();
    let clock = Arc::new(ManualClock::starting_now());
    let store = SqlxCertificateStore::new(db.connect().await);

    let instance = manager(Arc::new(store.clone()), clock.clone());
    instance.get(CertificateType::Signing).await.unwrap();
    let current = instance.stored_record(CertificateType::Signing).await.unwrap().unwrap();

    let mut replacement = current.clone();
    replacement.concurrency_token = ConcurrencyToken::new();
    let stale = ConcurrencyToken::new();

    let outcome = store.replace_if_unchanged(&current.key, &stale, replacement).await.unwrap();
    assert_eq!(outcome, ReplaceOutcome::Conflict);
    assert_eq!(store.fetch(&current.key).await.unwrap(), Some(current));
}

#[tokio::test]
async fn test_every_pool_sees_the_migrated_schema() {
    let db = TestDatabase::new();
    let first = db.connect().await;
    let second = db.connect().await;

    assert!(validate_migrations(&first).await.unwrap());
    assert!(validate_migrations(&second).await.unwrap());
    assert_eq!(
        get_migration_version(&first).await.unwrap(),
        get_migration_version(&second).await.unwrap()
    );
}
