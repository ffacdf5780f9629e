//! Integration tests for the on-disk BIN table store
//!
//! Each test works in its own temporary directory so table files never leak
//! between runs.

use poi_storage::{Database, DatabaseConfig};
use poi_storage::{BinTableStore, NewBinEntry, SqliteBinTableStore, StorageError};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Barrier;

#[tokio::test]
async fn test_table_file_counts_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("counted.db");

    let db = Database::open(DatabaseConfig::new(&path)).await.unwrap();
    assert!(path.exists());
    assert_eq!(db.entry_count().await.unwrap(), 0);

    let mut store = SqliteBinTableStore::with_database("counted", db.clone());
    store.insert(&NewBinEntry::new("4", "VISA")).await.unwrap();
    assert_eq!(db.entry_count().await.unwrap(), 1);
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_migration_idempotency() {
    let db = Database::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    db.migrate().await.unwrap();
    assert_eq!(db.entry_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_open_creates_table_file() {
    let dir = TempDir::new().unwrap();
    let mut store = SqliteBinTableStore::new(dir.path());

    store.open("bins").await.unwrap();
    assert!(store.is_open());
    assert_eq!(store.name(), Some("bins"));
    assert!(dir.path().join("bins.db").exists());

    store.close().await.unwrap();
    assert!(!store.is_open());
    assert_eq!(store.name(), None);

    // Closing twice is fine.
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_entries_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let mut store = SqliteBinTableStore::new(dir.path());

    store.open("bins").await.unwrap();
    let id = store
        .insert(&NewBinEntry::new("5100", "MASTERCARD").pan_length(16))
        .await
        .unwrap();
    store.close().await.unwrap();

    assert!(matches!(
        store.find_by_id(id).await,
        Err(StorageError::NotOpen)
    ));

    store.open("bins").await.unwrap();
    let entry = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(entry.network, "MASTERCARD");
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_tables_are_isolated_by_name() {
    let dir = TempDir::new().unwrap();
    let mut store = SqliteBinTableStore::new(dir.path());

    store.open("primary").await.unwrap();
    store.insert(&NewBinEntry::new("4", "VISA")).await.unwrap();

    // Opening another name switches tables.
    store.open("secondary").await.unwrap();
    assert_eq!(store.name(), Some("secondary"));
    assert!(store.classify("4111111111111111").await.unwrap().is_none());

    store.open("primary").await.unwrap();
    assert!(store.classify("4111111111111111").await.unwrap().is_some());
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_bin_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut store = SqliteBinTableStore::new(dir.path());
    store.open("bins").await.unwrap();

    store.insert(&NewBinEntry::new("4", "VISA")).await.unwrap();
    let error = store.insert(&NewBinEntry::new("4", "OTHER")).await.unwrap_err();
    assert!(matches!(error, StorageError::Database(_)));

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_classification() {
    let dir = TempDir::new().unwrap();
    let mut store = SqliteBinTableStore::new(dir.path());
    store.open("bins").await.unwrap();
    store.insert(&NewBinEntry::new("4", "VISA")).await.unwrap();
    store.insert(&NewBinEntry::new("5", "MASTERCARD")).await.unwrap();

    const NUM_CONCURRENT_TASKS: usize = 8;
    let store = Arc::new(store);
    let barrier = Arc::new(Barrier::new(NUM_CONCURRENT_TASKS));

    let handles: Vec<_> = (0..NUM_CONCURRENT_TASKS)
        .map(|i| {
            let store = store.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                let pan = if i % 2 == 0 {
                    "4111111111111111"
                } else {
                    "5500000000000004"
                };
                store.classify(pan).await.unwrap().map(|e| e.network)
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    for (i, result) in results.into_iter().enumerate() {
        let expected = if i % 2 == 0 { "VISA" } else { "MASTERCARD" };
        assert_eq!(result.unwrap().as_deref(), Some(expected));
    }
}
