//! Database schema and versioning (`PRAGMA user_version`)

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    id    INTEGER PRIMARY KEY,
    type  BLOB NOT NULL,
    name  BLOB NOT NULL,
    value BLOB NOT NULL,
    key   BLOB NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_items_type_name ON items(type, name);

CREATE TABLE IF NOT EXISTS metadata (
    id    INTEGER PRIMARY KEY CHECK (id = 1),
    value BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS tags_encrypted (
    name    BLOB NOT NULL,
    value   BLOB NOT NULL,
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    PRIMARY KEY (name, item_id)
);
CREATE INDEX IF NOT EXISTS idx_tags_encrypted_name ON tags_encrypted(name);
CREATE INDEX IF NOT EXISTS idx_tags_encrypted_value ON tags_encrypted(value);
CREATE INDEX IF NOT EXISTS idx_tags_encrypted_item_id ON tags_encrypted(item_id);

CREATE TABLE IF NOT EXISTS tags_plaintext (
    name    TEXT NOT NULL,
    value   TEXT NOT NULL,
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    PRIMARY KEY (name, item_id)
);
CREATE INDEX IF NOT EXISTS idx_tags_plaintext_name ON tags_plaintext(name);
CREATE INDEX IF NOT EXISTS idx_tags_plaintext_value ON tags_plaintext(value);
CREATE INDEX IF NOT EXISTS idx_tags_plaintext_item_id ON tags_plaintext(item_id);
"#;

/// Create tables on a fresh database, refuse databases from a newer build.
pub fn init_schema(conn: &Connection) -> StoreResult<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version > SCHEMA_VERSION {
        return Err(StoreError::SchemaVersion {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }

    if version == 0 {
        info!(version = SCHEMA_VERSION, "creating wallet schema");
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    } else {
        debug!(version, "wallet schema up to date");
    }
    Ok(())
}
