#![allow(async_fn_in_trait)]

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use crate::connection::{Database, DatabaseConfig};
use crate::error::{StorageError, StorageResult};
use crate::models::{BinEntry, NewBinEntry, validate_pan};

/// Persistent BIN table: a named lookup store of card ranges.
///
/// A store is opened by name, used, and closed. Every data call on a closed
/// store fails with [`StorageError::NotOpen`].
pub trait BinTableStore: Send + Sync {
    /// Open (creating if needed) the table called `name`. Opening while
    /// another table is open closes the previous one first.
    async fn open(&mut self, name: &str) -> StorageResult<()>;

    /// Close the table. Closing a closed store succeeds.
    async fn close(&mut self) -> StorageResult<()>;

    fn is_open(&self) -> bool;

    /// Remove every range, returning how many were deleted.
    async fn delete_all(&self) -> StorageResult<u64>;

    async fn find_by_id(&self, bin_id: i64) -> StorageResult<Option<BinEntry>>;

    /// Store a new range and return its id.
    async fn insert(&self, entry: &NewBinEntry) -> StorageResult<i64>;

    /// Find the range with the longest BIN that prefixes `pan` and whose PAN
    /// length restriction (if any) matches.
    async fn classify(&self, pan: &str) -> StorageResult<Option<BinEntry>>;
}

/// SQLite implementation of [`BinTableStore`]; each table is one database
/// file `<name>.db` inside the store directory.
pub struct SqliteBinTableStore {
    directory: PathBuf,
    database: Option<Database>,
    name: Option<String>,
}

impl SqliteBinTableStore {
    /// Create a closed store rooted at `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            database: None,
            name: None,
        }
    }

    /// Wrap an already open database, e.g. [`Database::in_memory`].
    pub fn with_database(name: impl Into<String>, database: Database) -> Self {
        Self {
            directory: PathBuf::new(),
            database: Some(database),
            name: Some(name.into()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Name of the open table.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn database(&self) -> StorageResult<&Database> {
        self.database.as_ref().ok_or(StorageError::NotOpen)
    }

    fn table_path(&self, name: &str) -> StorageResult<PathBuf> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        {
            return Err(StorageError::Validation(format!(
                "invalid table name {name:?}"
            )));
        }
        Ok(self.directory.join(format!("{name}.db")))
    }
}

impl BinTableStore for SqliteBinTableStore {
    async fn open(&mut self, name: &str) -> StorageResult<()> {
        let path = self.table_path(name)?;
        if self.database.is_some() {
            self.close().await?;
        }

        self.database = Some(Database::open(DatabaseConfig::new(&path)).await?);
        self.name = Some(name.to_string());

        info!(table = name, path = %path.display(), "BIN table opened");
        Ok(())
    }

    async fn close(&mut self) -> StorageResult<()> {
        if let Some(database) = self.database.take() {
            database.close().await;
            debug!(table = ?self.name, "BIN table closed");
        }
        self.name = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.database.is_some()
    }

    async fn delete_all(&self) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM bin_entries")
            .execute(self.database()?.pool())
            .await?;

        info!(deleted = result.rows_affected(), "BIN table cleared");
        Ok(result.rows_affected())
    }

    async fn find_by_id(&self, bin_id: i64) -> StorageResult<Option<BinEntry>> {
        let entry = sqlx::query_as::<_, BinEntry>(
            r#"
            SELECT bin_id, bin, bin_length, pan_length, network, is_debit, created_at
            FROM bin_entries
            WHERE bin_id = ?
            "#,
        )
        .bind(bin_id)
        .fetch_optional(self.database()?.pool())
        .await?;

        Ok(entry)
    }

    async fn insert(&self, entry: &NewBinEntry) -> StorageResult<i64> {
        entry.validate()?;
        let pool = self.database()?.pool();

        let result = sqlx::query(
            r#"
            INSERT INTO bin_entries (bin, bin_length, pan_length, network, is_debit, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.bin)
        .bind(entry.bin.len() as i64)
        .bind(i64::from(entry.pan_length))
        .bind(entry.network.trim())
        .bind(entry.is_debit)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn classify(&self, pan: &str) -> StorageResult<Option<BinEntry>> {
        validate_pan(pan)?;

        let entry = sqlx::query_as::<_, BinEntry>(
            r#"
            SELECT bin_id, bin, bin_length, pan_length, network, is_debit, created_at
            FROM bin_entries
            WHERE substr(?1, 1, bin_length) = bin
              AND (pan_length = 0 OR pan_length = ?2)
            ORDER BY bin_length DESC
            LIMIT 1
            "#,
        )
        .bind(pan)
        .bind(pan.len() as i64)
        .fetch_optional(self.database()?.pool())
        .await?;

        debug!(
            bin_length = entry.as_ref().map(|e| e.bin_length),
            "BIN classification"
        );
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteBinTableStore {
        SqliteBinTableStore::with_database("memory", Database::in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_closed_store_rejects_calls() {
        let store = SqliteBinTableStore::new("unused");
        assert!(!store.is_open());
        assert!(matches!(store.find_by_id(1).await, Err(StorageError::NotOpen)));
        assert!(matches!(store.delete_all().await, Err(StorageError::NotOpen)));
    }

    #[tokio::test]
    async fn test_invalid_table_name() {
        let mut store = SqliteBinTableStore::new("unused");
        for name in ["", "../escape", "a/b", "bins.db"] {
            let error = store.open(name).await.unwrap_err();
            assert!(matches!(error, StorageError::Validation(_)), "{name}");
        }
        assert!(!store.is_open());
    }

    #[tokio::test]
    async fn test_insert_and_find_by_id() {
        let store = store().await;
        let id = store
            .insert(&NewBinEntry::new("4111", " VISA ").pan_length(16))
            .await
            .unwrap();

        let entry = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(entry.bin, "4111");
        assert_eq!(entry.bin_length, 4);
        assert_eq!(entry.pan_length, 16);
        assert_eq!(entry.network, "VISA");
        assert!(!entry.is_debit);

        assert!(store.find_by_id(id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_entry() {
        let store = store().await;
        let error = store.insert(&NewBinEntry::new("", "VISA")).await.unwrap_err();
        assert!(matches!(error, StorageError::Validation(_)));
    }

    #[tokio::test]
    async fn test_classify_prefers_longest_prefix() {
        let store = store().await;
        store.insert(&NewBinEntry::new("4", "VISA")).await.unwrap();
        store
            .insert(&NewBinEntry::new("431274", "VISA DEBIT").debit(true))
            .await
            .unwrap();

        let entry = store.classify("4312740000000001").await.unwrap().unwrap();
        assert_eq!(entry.network, "VISA DEBIT");
        assert!(entry.is_debit);

        let entry = store.classify("4000000000000002").await.unwrap().unwrap();
        assert_eq!(entry.network, "VISA");
    }

    #[tokio::test]
    async fn test_classify_checks_pan_length() {
        let store = store().await;
        store
            .insert(&NewBinEntry::new("34", "AMEX").pan_length(15))
            .await
            .unwrap();

        assert!(store.classify("340000000000009").await.unwrap().is_some());
        assert!(store.classify("3400000000000009").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_classify_rejects_invalid_pan() {
        let store = store().await;
        assert!(matches!(
            store.classify("4111").await,
            Err(StorageError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_all() {
        let store = store().await;
        store.insert(&NewBinEntry::new("4", "VISA")).await.unwrap();
        store.insert(&NewBinEntry::new("5", "MASTERCARD")).await.unwrap();

        assert_eq!(store.delete_all().await.unwrap(), 2);
        assert_eq!(store.delete_all().await.unwrap(), 0);
        assert!(store.classify("4111111111111111").await.unwrap().is_none());
    }
}
