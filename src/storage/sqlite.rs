//! SQLite-based watermark store implementation

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, error, info};

use super::models::{AccountRecord, ItemRecord};
use crate::types::DeliveryReference;

/// Storage error type
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// SQLite-based watermark store
///
/// Owns account records and item records. Every write is a single statement,
/// so an interrupted pass leaves each item either absent, pending
/// (null reference) or delivered.
pub struct WatermarkStore {
    /// Database connection (protected by mutex for thread safety)
    conn: Mutex<Connection>,
}

impl WatermarkStore {
    /// Create or open a store at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening watermark store at {:?}", path);

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;

        Ok(store)
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> StorageResult<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize database schema
    fn initialize_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_account_id TEXT NOT NULL,
                destination_channel_id TEXT NOT NULL,
                watermark INTEGER NOT NULL,
                hint_username TEXT,
                UNIQUE (remote_account_id, destination_channel_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS items (
                account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                remote_item_id TEXT NOT NULL,
                delivery_reference TEXT,
                PRIMARY KEY (account_id, remote_item_id)
            )",
            [],
        )?;

        debug!("Watermark store schema initialized");
        Ok(())
    }

    /// Load the account record for a pair, creating it with `now` as its watermark
    pub fn get_or_create_account(
        &self,
        remote_account_id: &str,
        destination_channel_id: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<AccountRecord> {
        let conn = self.conn.lock();

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO accounts (remote_account_id, destination_channel_id, watermark)
             VALUES (?1, ?2, ?3)",
            params![remote_account_id, destination_channel_id, now.timestamp()],
        )?;
        if inserted > 0 {
            info!(
                "Created account record for {} -> {} (watermark {})",
                remote_account_id, destination_channel_id, now
            );
        }

        let (id, watermark, hint_username): (i64, i64, Option<String>) = conn.query_row(
            "SELECT id, watermark, hint_username FROM accounts
             WHERE remote_account_id = ?1 AND destination_channel_id = ?2",
            params![remote_account_id, destination_channel_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(AccountRecord {
            id,
            remote_account_id: remote_account_id.to_string(),
            destination_channel_id: destination_channel_id.to_string(),
            watermark: from_unix(watermark)?,
            hint_username,
        })
    }

    /// Refresh the cached username shown for an account
    pub fn update_hint_username(&self, account_id: i64, username: &str) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE accounts SET hint_username = ?2 WHERE id = ?1",
            params![account_id, username],
        )?;
        Ok(())
    }

    /// All item records of an account
    pub fn items_for_account(&self, account_id: i64) -> StorageResult<Vec<ItemRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT remote_item_id, delivery_reference FROM items
             WHERE account_id = ?1 ORDER BY rowid",
        )?;

        let rows = stmt.query_map(params![account_id], |row| {
            Ok(ItemRecord {
                account_id,
                remote_item_id: row.get(0)?,
                delivery_reference: row.get::<_, Option<String>>(1)?.map(DeliveryReference),
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Look up a single item record
    pub fn get_item(
        &self,
        account_id: i64,
        remote_item_id: &str,
    ) -> StorageResult<Option<ItemRecord>> {
        let conn = self.conn.lock();
        let reference = conn
            .query_row(
                "SELECT delivery_reference FROM items
                 WHERE account_id = ?1 AND remote_item_id = ?2",
                params![account_id, remote_item_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;

        Ok(reference.map(|reference| ItemRecord {
            account_id,
            remote_item_id: remote_item_id.to_string(),
            delivery_reference: reference.map(DeliveryReference),
        }))
    }

    /// Record that delivery of an item is about to be attempted
    ///
    /// Returns `true` if a new pending record was inserted, `false` if a record
    /// from an earlier attempt already exists.
    pub fn begin_delivery(&self, account_id: i64, remote_item_id: &str) -> StorageResult<bool> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO items (account_id, remote_item_id, delivery_reference)
             VALUES (?1, ?2, NULL)",
            params![account_id, remote_item_id],
        )?;

        if inserted > 0 {
            debug!("Created pending item record {}", remote_item_id);
        } else {
            debug!(
                "Item record {} already exists, retrying delivery",
                remote_item_id
            );
        }
        Ok(inserted > 0)
    }

    /// Store the reference of a confirmed delivery
    pub fn mark_delivered(
        &self,
        account_id: i64,
        remote_item_id: &str,
        reference: &DeliveryReference,
    ) -> StorageResult<()> {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO items (account_id, remote_item_id, delivery_reference)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (account_id, remote_item_id)
             DO UPDATE SET delivery_reference = excluded.delivery_reference",
            params![account_id, remote_item_id, reference.as_str()],
        );

        match result {
            Ok(_) => {
                debug!("Item {} delivered as {}", remote_item_id, reference);
                Ok(())
            }
            Err(e) => {
                error!(
                    "Failed to record delivery of {} as {}: {}",
                    remote_item_id, reference, e
                );
                Err(e.into())
            }
        }
    }

    /// Remove an item record after its notification was retracted
    ///
    /// Returns `true` if a record was deleted.
    pub fn delete_item(&self, account_id: i64, remote_item_id: &str) -> StorageResult<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM items WHERE account_id = ?1 AND remote_item_id = ?2",
            params![account_id, remote_item_id],
        )?;
        Ok(deleted > 0)
    }
}

fn from_unix(secs: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or(StorageError::InvalidTimestamp(secs))
}
