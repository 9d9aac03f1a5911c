//! Concurrency tests for the single-flight lock.

use futures::future::join_all;
use juris_abstraction::KeyValueStore;
use juris_store::{Database, DistributedLock, LockAttempt, LockConfig, MemoryKvStore, SqliteKvStore};
use std::sync::Arc;

async fn race(kv: Arc<dyn KeyValueStore>, contenders: usize) -> Vec<LockAttempt> {
    let lock = DistributedLock::new(kv, LockConfig::default()).unwrap();

    let tasks = (0..contenders).map(|_| {
        let lock = lock.clone();
        tokio::spawn(async move { lock.try_acquire("case-7:analysis").await.unwrap() })
    });

    join_all(tasks).await.into_iter().map(Result::unwrap).collect()
}

fn assert_single_winner(outcomes: &[LockAttempt]) {
    let winners = outcomes.iter().filter(|o| o.is_acquired()).count();
    assert_eq!(winners, 1, "exactly one contender must acquire the lock");

    for outcome in outcomes {
        if let LockAttempt::Busy { retry_after_secs } = outcome {
            assert!(*retry_after_secs > 0);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_memory_store_single_winner() {
    let outcomes = race(Arc::new(MemoryKvStore::new()), 32).await;
    assert_single_winner(&outcomes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_sqlite_handles_single_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locks.db");

    let lock_for = |path: &std::path::Path| {
        let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteKvStore::new(Database::open(path).unwrap()));
        DistributedLock::new(kv, LockConfig::default()).unwrap()
    };

    // One connection per contender, as separate worker processes would have.
    let tasks = (0..8).map(|_| {
        let lock = lock_for(&path);
        tokio::spawn(async move { lock.try_acquire("case-7:analysis").await.unwrap() })
    });
    let outcomes: Vec<LockAttempt> = join_all(tasks).await.into_iter().map(Result::unwrap).collect();

    assert_single_winner(&outcomes);
}

#[tokio::test]
async fn test_loser_sees_roughly_full_ttl() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
    let lock = DistributedLock::new(kv, LockConfig { ttl_secs: 600 }).unwrap();

    assert!(lock.try_acquire("k").await.unwrap().is_acquired());
    match lock.try_acquire("k").await.unwrap() {
        LockAttempt::Busy { retry_after_secs } => assert!((595..=600).contains(&retry_after_secs)),
        LockAttempt::Acquired(_) => panic!("second caller must not acquire"),
    }
}
