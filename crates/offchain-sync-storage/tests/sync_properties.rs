//! End-to-end checkpoint and rewind behaviour of `SyncStore` over the memory backend.

use std::sync::Arc;
use std::time::Duration;

use offchain_sync_core::{Hash, OffChainData, SyncError, SyncStateDb, SyncStore};
use offchain_sync_storage::{Fault, InMemoryStorage, Step};

fn entry(b: u8) -> OffChainData {
    OffChainData::new(Hash([b; 32]), format!("payload-{b}").into_bytes())
}

fn new_store() -> SyncStore<InMemoryStorage> {
    SyncStore::new(InMemoryStorage::new())
}

// ── Resume point ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn resume_is_one_block_behind_checkpoint() {
    let store = new_store();
    assert_eq!(store.get_start_block().await.block, 0);

    for b in [1u64, 2, 10, 1_000_000] {
        store.set_start_block(b).await.unwrap();
        assert_eq!(store.get_start_block().await.block, b - 1);
    }
}

#[tokio::test]
async fn failed_read_resumes_from_genesis() {
    let store = new_store();
    store.store(500, &[entry(1)]).await.unwrap();
    store.db().inject(Fault::Fail(Step::ReadCheckpoint)).unwrap();

    let start = store.get_start_block().await;
    assert_eq!(start.block, 0);
    assert!(start.error.is_some());
    assert!(store.get_start_block().await.into_result().is_err());
}

// ── Atomic batch ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_store_makes_batch_and_checkpoint_visible() {
    let store = new_store();
    let batch = [entry(1), entry(2), entry(3)];

    store.store(42, &batch).await.unwrap();

    assert_eq!(store.get_start_block().await.block, 41);
    for e in &batch {
        assert!(store.exists(&e.key).await);
        assert_eq!(store.db().get_offchain_data(&e.key).unwrap(), Some(e.value.clone()));
    }
}

#[tokio::test]
async fn failure_at_any_step_leaves_prior_state() {
    for step in [Step::Begin, Step::StoreData, Step::StoreCheckpoint, Step::Commit] {
        let store = new_store();
        store.store(10, &[entry(1)]).await.unwrap();

        store.db().inject(Fault::Fail(step)).unwrap();
        assert!(store.store(11, &[entry(2)]).await.is_err(), "{step:?}");
        store.db().clear_faults().unwrap();

        assert_eq!(store.get_start_block().await.block, 9, "{step:?}");
        assert!(!store.exists(&Hash([2; 32])).await, "{step:?}");
        assert_eq!(store.db().offchain_data_count().unwrap(), 1, "{step:?}");
    }
}

#[tokio::test]
async fn failed_body_is_rolled_back_exactly_once() {
    let store = new_store();
    store.db().inject(Fault::Fail(Step::StoreData)).unwrap();

    store.store(1, &[entry(1)]).await.unwrap_err();

    assert_eq!(store.db().transaction_counts().unwrap(), (0, 1));
}

#[tokio::test]
async fn rollback_failure_keeps_original_error() {
    let store = new_store();
    store.db().inject(Fault::Fail(Step::StoreCheckpoint)).unwrap();
    store.db().inject(Fault::Fail(Step::Rollback)).unwrap();

    let err = store.store(1, &[entry(1)]).await.unwrap_err();
    assert!(err.to_string().contains("StoreCheckpoint"), "{err}");
}

#[tokio::test(start_paused = true)]
async fn stalled_write_times_out_without_partial_state() {
    let store = SyncStore::with_timeout(InMemoryStorage::new(), Duration::from_secs(2));
    store.store(7, &[entry(1)]).await.unwrap();
    store.db().inject(Fault::Stall(Step::StoreCheckpoint)).unwrap();

    let err = store.store(8, &[entry(2)]).await.unwrap_err();
    assert!(err.is_timeout());

    store.db().clear_faults().unwrap();
    assert_eq!(store.get_start_block().await.block, 6);
    assert!(!store.exists(&Hash([2; 32])).await);
    assert_eq!(store.db().transaction_counts().unwrap(), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn stalled_read_times_out_to_genesis() {
    let store = SyncStore::with_timeout(InMemoryStorage::new(), Duration::from_millis(100));
    store.store(300, &[]).await.unwrap();
    store.db().inject(Fault::Stall(Step::ReadCheckpoint)).unwrap();

    let start = store.get_start_block().await;
    assert_eq!(start.block, 0);
    assert!(matches!(
        start.error,
        Some(SyncError::Timeout { operation: "get_start_block", .. })
    ));
}

// ── Monotonic checkpoint, rewind ──────────────────────────────────────────────

#[tokio::test]
async fn increasing_stores_end_at_last_block() {
    let store = new_store();
    for (i, b) in [5u64, 9, 30, 31].into_iter().enumerate() {
        store.store(b, &[entry(i as u8)]).await.unwrap();
    }
    assert_eq!(store.get_start_block().await.block, 30);
}

#[tokio::test]
async fn rewind_sets_checkpoint_to_ancestor() {
    let store = new_store();
    store.store(100, &[entry(1)]).await.unwrap();
    store.store(120, &[entry(2)]).await.unwrap();

    store.rewind_start_block(80).await.unwrap();
    assert_eq!(store.get_start_block().await.block, 79);

    // Rewinding to the current checkpoint is a no-op.
    store.rewind_start_block(80).await.unwrap();
    assert_eq!(store.get_start_block().await.block, 79);

    // Entries above the ancestor are kept.
    assert!(store.exists(&Hash([2; 32])).await);
}

#[tokio::test]
async fn rewind_above_checkpoint_leaves_it_unchanged() {
    let store = new_store();
    store.store(10, &[]).await.unwrap();

    store.rewind_start_block(11).await.unwrap();
    assert_eq!(store.db().get_last_processed_block().await.unwrap(), 10);
    assert_eq!(store.get_start_block().await.block, 9);
}

#[tokio::test]
async fn rewind_storage_error_propagates() {
    let store = new_store();
    store.store(10, &[]).await.unwrap();
    store.db().inject(Fault::Fail(Step::Reset)).unwrap();

    assert!(matches!(
        store.rewind_start_block(5).await,
        Err(SyncError::Storage(_))
    ));
}

// ── Dedup ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn restoring_same_key_keeps_first_content() {
    let store = new_store();
    let key = Hash([0x5a; 32]);

    store
        .store(1, &[OffChainData::new(key, b"original".to_vec())])
        .await
        .unwrap();
    assert!(store.exists(&key).await);

    store
        .store(2, &[OffChainData::new(key, b"tampered".to_vec())])
        .await
        .unwrap();

    assert_eq!(store.db().get_offchain_data(&key).unwrap(), Some(b"original".to_vec()));
    assert_eq!(store.get_start_block().await.block, 1);
}

#[tokio::test]
async fn exists_resolves_errors_to_absent() {
    let store = new_store();
    store.store(1, &[entry(1)]).await.unwrap();
    store.db().inject(Fault::Fail(Step::Exists)).unwrap();

    assert!(!store.exists(&Hash([1; 32])).await);
    assert!(store.lookup(&Hash([1; 32])).await.is_err());
}

// ── Scenario ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn store_then_reorg_scenario() {
    let store = new_store();
    assert_eq!(store.get_start_block().await.block, 0);

    store.store(100, &[entry(0xa)]).await.unwrap();
    assert_eq!(store.get_start_block().await.block, 99);

    store.rewind_start_block(50).await.unwrap();
    assert_eq!(store.get_start_block().await.block, 49);
}

// ── Single writer ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_writers_are_serialised() {
    let store = Arc::new(new_store());

    let handles: Vec<_> = (1..=20u8)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.store(u64::from(i), &[entry(i)]).await })
        })
        .collect();
    for h in handles {
        h.await.unwrap().unwrap();
    }

    assert_eq!(store.db().offchain_data_count().unwrap(), 20);
    assert_eq!(store.get_start_block().await.block, 19);
    assert_eq!(store.db().transaction_counts().unwrap(), (20, 0));
}
