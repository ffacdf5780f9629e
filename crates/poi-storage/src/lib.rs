//! Persistent BIN table for card-range classification.
//!
//! A BIN table maps leading card-number digits to a card network. The store
//! is opened by name, can be cleared, and answers lookups either by row id or
//! by classifying a full PAN against the longest matching prefix.
//!
//! # Architecture
//!
//! - [`Database`] - SQLite connection pool with embedded migrations
//! - [`BinTableStore`] - Store contract, implemented by [`SqliteBinTableStore`]
//! - [`BinEntry`] / [`NewBinEntry`] - Stored ranges and insert values
//!
//! # Examples
//!
//! ```no_run
//! use poi_storage::{BinTableStore, NewBinEntry, SqliteBinTableStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = SqliteBinTableStore::new("/var/lib/poi");
//! store.open("bins").await?;
//!
//! store.insert(&NewBinEntry::new("4", "VISA")).await?;
//! if let Some(entry) = store.classify("4111111111111111").await? {
//!     println!("network: {}", entry.network);
//! }
//!
//! store.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{BinEntry, NewBinEntry};
pub use repositories::{BinTableStore, SqliteBinTableStore};
