//! sealkeep-store: relational item store for the sealkeep wallet
//!
//! Tables:
//! - `items` - one row per record: encrypted type/name/value and the wrapped item key
//! - `tags_encrypted` / `tags_plaintext` - tag indices, cascade-deleted with their item
//! - `metadata` - a single row holding the sealed key set
//!
//! The store only ever sees ciphertext for items and encrypted tags. Every
//! logical write runs inside one transaction via [`ItemStore::write`].

pub mod error;
pub mod items;
pub mod metadata;
pub mod models;
pub mod schema;
pub mod tags;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

pub use rusqlite::{Connection, Transaction};
use tracing::{debug, info};

pub use error::{StoreError, StoreResult};
pub use models::{EncryptedTag, Item, Metadata, NewItem, PlaintextTag};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store. One connection, serialized behind a mutex.
pub struct ItemStore {
    conn: Mutex<Connection>,
}

impl ItemStore {
    /// Open or create the wallet database at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        info!(path = %path.display(), "opening wallet database");
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory wallet database");
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run read-only queries against the connection.
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }

    /// Run `f` inside one transaction. Commits if `f` returns `Ok`, rolls back
    /// otherwise (the transaction is dropped uncommitted).
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction().map_err(StoreError::from)?;
        let out = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }
}

impl std::fmt::Debug for ItemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_item<'a>(name: &'a [u8]) -> NewItem<'a> {
        NewItem {
            record_type: b"pw",
            name,
            value: b"v",
            key: b"k",
        }
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let store = ItemStore::open_in_memory().unwrap();

        let result: StoreResult<()> = store.write(|tx| {
            items::insert(tx, new_item(b"a"))?;
            items::insert(tx, new_item(b"a"))?;
            Ok(())
        });

        assert!(matches!(result, Err(StoreError::Conflict)));
        assert_eq!(store.read(items::count).unwrap(), 0, "first insert rolled back");
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.db");

        {
            let store = ItemStore::open(&path).unwrap();
            store.write(|tx| items::insert(tx, new_item(b"a"))).unwrap();
            store.write(|tx| metadata::create(tx, b"keys")).unwrap();
        }

        let store = ItemStore::open(&path).unwrap();
        assert_eq!(store.read(items::count).unwrap(), 1);
        assert!(store.read(metadata::get).unwrap().is_some());
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let store = ItemStore::open_in_memory().unwrap();
        let result = store.write(|tx| {
            tags::insert_plaintext(
                tx,
                &PlaintextTag {
                    item_id: 999,
                    name: "~x".into(),
                    value: "y".into(),
                },
            )
        });
        assert!(result.is_err(), "tag for a missing item must be rejected");
    }
}
