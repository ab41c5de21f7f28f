//! Item CRUD. Every function takes a `&Connection` so it can run either
//! directly or inside a `Transaction` (which derefs to one).

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{StoreError, StoreResult};
use crate::models::{Item, NewItem};

const SELECT_ITEM: &str = "SELECT id, type, name, value, key FROM items";

/// Insert an item. A duplicate (type, name) yields `StoreError::Conflict`.
pub fn insert(conn: &Connection, item: NewItem<'_>) -> StoreResult<i64> {
    conn.execute(
        "INSERT INTO items (type, name, value, key) VALUES (?1, ?2, ?3, ?4)",
        params![item.record_type, item.name, item.value, item.key],
    )
    .map_err(StoreError::from_insert)?;
    Ok(conn.last_insert_rowid())
}

pub fn find(conn: &Connection, record_type: &[u8], name: &[u8]) -> StoreResult<Option<Item>> {
    let item = conn
        .query_row(
            &format!("{SELECT_ITEM} WHERE type = ?1 AND name = ?2"),
            params![record_type, name],
            Item::from_row,
        )
        .optional()?;
    Ok(item)
}

pub fn find_by_type(conn: &Connection, record_type: &[u8]) -> StoreResult<Vec<Item>> {
    let mut stmt = conn.prepare(&format!("{SELECT_ITEM} WHERE type = ?1 ORDER BY id"))?;
    let items = stmt
        .query_map(params![record_type], Item::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn all(conn: &Connection) -> StoreResult<Vec<Item>> {
    let mut stmt = conn.prepare(&format!("{SELECT_ITEM} ORDER BY id"))?;
    let items = stmt
        .query_map([], Item::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn count(conn: &Connection) -> StoreResult<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
    Ok(n as u64)
}

/// Replace an item's value and wrapped key. Returns false if the id is unknown.
pub fn update_value(conn: &Connection, id: i64, value: &[u8], key: &[u8]) -> StoreResult<bool> {
    let changed = conn.execute(
        "UPDATE items SET value = ?1, key = ?2 WHERE id = ?3",
        params![value, key, id],
    )?;
    Ok(changed > 0)
}

/// Delete an item; its tags go with it (ON DELETE CASCADE).
pub fn delete(conn: &Connection, id: i64) -> StoreResult<bool> {
    let changed = conn.execute("DELETE FROM items WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}
