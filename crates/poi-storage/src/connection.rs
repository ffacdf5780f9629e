//! SQLite files backing BIN tables.
//!
//! Every BIN table is its own small database file. Lookups happen once per
//! card read, so the pool stays tiny and the file is opened in WAL mode to
//! let a loader rewrite the table while a session classifies cards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Settings for one BIN table file.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path of the table file
    pub path: PathBuf,

    /// Pool size; one writer plus a reader is plenty for a BIN table
    pub max_connections: u32,

    /// How long a statement waits on a locked file
    pub busy_timeout: Duration,

    /// Create the file (and its directory) when missing
    pub create_if_missing: bool,

    /// Apply the schema migrations after opening
    pub migrate: bool,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: 2,
            busy_timeout: Duration::from_secs(5),
            create_if_missing: true,
            migrate: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn migrate(mut self, migrate: bool) -> Self {
        self.migrate = migrate;
        self
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(self.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.busy_timeout)
            .disable_statement_logging()
    }
}

/// An open BIN table file.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the table file described by `config`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use poi_storage::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::open(DatabaseConfig::new("bins/default.db")).await?;
    /// println!("{} BIN ranges", db.entry_count().await?);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open(config: DatabaseConfig) -> StorageResult<Self> {
        if config.create_if_missing {
            ensure_parent(&config.path)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(config.connect_options())
            .await?;
        debug!(path = %config.path.display(), "BIN table file opened");

        let db = Self { pool };
        if config.migrate {
            db.migrate().await?;
        }
        Ok(db)
    }

    /// A private table that lives as long as the returned handle.
    pub async fn in_memory() -> StorageResult<Self> {
        // Each connection to :memory: sees its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of BIN ranges in the table.
    pub async fn entry_count(&self) -> StorageResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM bin_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn ensure_parent(path: &Path) -> StorageResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Configuration(format!(
                    "cannot create {}: {e}",
                    parent.display()
                ))
            })
        }
        _ => Ok(()),
    }
}
