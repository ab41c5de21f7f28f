//! Tag indices. Encrypted tags hold deterministic ciphertext, so equality
//! search works on them; only plaintext tags support prefix search.

use rusqlite::{params, Connection};

use crate::error::StoreResult;
use crate::models::{EncryptedTag, Item, PlaintextTag};

pub fn insert_encrypted(conn: &Connection, tag: &EncryptedTag) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO tags_encrypted (name, value, item_id) VALUES (?1, ?2, ?3)",
        params![tag.name, tag.value, tag.item_id],
    )?;
    Ok(())
}

pub fn insert_plaintext(conn: &Connection, tag: &PlaintextTag) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO tags_plaintext (name, value, item_id) VALUES (?1, ?2, ?3)",
        params![tag.name, tag.value, tag.item_id],
    )?;
    Ok(())
}

pub fn encrypted_for_item(conn: &Connection, item_id: i64) -> StoreResult<Vec<EncryptedTag>> {
    let mut stmt = conn.prepare(
        "SELECT name, value, item_id FROM tags_encrypted WHERE item_id = ?1 ORDER BY name",
    )?;
    let tags = stmt
        .query_map(params![item_id], EncryptedTag::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}

pub fn plaintext_for_item(conn: &Connection, item_id: i64) -> StoreResult<Vec<PlaintextTag>> {
    let mut stmt = conn.prepare(
        "SELECT name, value, item_id FROM tags_plaintext WHERE item_id = ?1 ORDER BY name",
    )?;
    let tags = stmt
        .query_map(params![item_id], PlaintextTag::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}

/// Drop both tag sets of an item, ahead of writing replacements.
pub fn delete_for_item(conn: &Connection, item_id: i64) -> StoreResult<()> {
    conn.execute("DELETE FROM tags_encrypted WHERE item_id = ?1", params![item_id])?;
    conn.execute("DELETE FROM tags_plaintext WHERE item_id = ?1", params![item_id])?;
    Ok(())
}

fn query_items<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> StoreResult<Vec<Item>> {
    let mut stmt = conn.prepare(sql)?;
    let items = stmt
        .query_map(params, Item::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

/// Items of `record_type` carrying an encrypted tag with exactly this name and value.
pub fn find_items_by_encrypted(
    conn: &Connection,
    record_type: &[u8],
    name: &[u8],
    value: &[u8],
) -> StoreResult<Vec<Item>> {
    query_items(
        conn,
        "SELECT i.id, i.type, i.name, i.value, i.key FROM items i
         JOIN tags_encrypted t ON t.item_id = i.id
         WHERE i.type = ?1 AND t.name = ?2 AND t.value = ?3
         ORDER BY i.id",
        params![record_type, name, value],
    )
}

pub fn find_items_by_plaintext(
    conn: &Connection,
    record_type: &[u8],
    name: &str,
    value: &str,
) -> StoreResult<Vec<Item>> {
    query_items(
        conn,
        "SELECT i.id, i.type, i.name, i.value, i.key FROM items i
         JOIN tags_plaintext t ON t.item_id = i.id
         WHERE i.type = ?1 AND t.name = ?2 AND t.value = ?3
         ORDER BY i.id",
        params![record_type, name, value],
    )
}

/// Prefix match on a plaintext tag value. Compares with `substr` so `%` and `_`
/// in the prefix are literal.
pub fn find_items_by_plaintext_prefix(
    conn: &Connection,
    record_type: &[u8],
    name: &str,
    prefix: &str,
) -> StoreResult<Vec<Item>> {
    query_items(
        conn,
        "SELECT i.id, i.type, i.name, i.value, i.key FROM items i
         JOIN tags_plaintext t ON t.item_id = i.id
         WHERE i.type = ?1 AND t.name = ?2 AND substr(t.value, 1, length(?3)) = ?3
         ORDER BY i.id",
        params![record_type, name, prefix],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items;
    use crate::models::NewItem;
    use crate::ItemStore;

    fn seed(store: &ItemStore, name: &[u8]) -> i64 {
        store
            .write(|tx| {
                items::insert(
                    tx,
                    NewItem {
                        record_type: b"pw",
                        name,
                        value: b"v",
                        key: b"k",
                    },
                )
            })
            .unwrap()
    }

    fn plain(item_id: i64, name: &str, value: &str) -> PlaintextTag {
        PlaintextTag {
            item_id,
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_tags_cascade_on_item_delete() {
        let store = ItemStore::open_in_memory().unwrap();
        let id = seed(&store, b"a");
        store
            .write(|tx| {
                insert_plaintext(tx, &plain(id, "~url", "https://example.com"))?;
                insert_encrypted(
                    tx,
                    &EncryptedTag {
                        item_id: id,
                        name: b"enc-name".to_vec(),
                        value: b"enc-value".to_vec(),
                    },
                )
            })
            .unwrap();

        assert_eq!(store.read(|c| plaintext_for_item(c, id)).unwrap().len(), 1);
        assert_eq!(store.read(|c| encrypted_for_item(c, id)).unwrap().len(), 1);

        store.write(|tx| items::delete(tx, id)).unwrap();

        assert!(store.read(|c| plaintext_for_item(c, id)).unwrap().is_empty());
        assert!(store.read(|c| encrypted_for_item(c, id)).unwrap().is_empty());
    }

    #[test]
    fn test_equality_and_prefix_search() {
        let store = ItemStore::open_in_memory().unwrap();
        let a = seed(&store, b"a");
        let b = seed(&store, b"b");
        store
            .write(|tx| {
                insert_plaintext(tx, &plain(a, "~host", "db.internal"))?;
                insert_plaintext(tx, &plain(b, "~host", "db.external"))
            })
            .unwrap();

        let exact = store
            .read(|c| find_items_by_plaintext(c, b"pw", "~host", "db.internal"))
            .unwrap();
        assert_eq!(exact.iter().map(|i| i.id).collect::<Vec<_>>(), vec![a]);

        let prefixed = store
            .read(|c| find_items_by_plaintext_prefix(c, b"pw", "~host", "db."))
            .unwrap();
        assert_eq!(prefixed.len(), 2);

        let other_type = store
            .read(|c| find_items_by_plaintext_prefix(c, b"note", "~host", "db."))
            .unwrap();
        assert!(other_type.is_empty());
    }

    #[test]
    fn test_prefix_wildcards_are_literal() {
        let store = ItemStore::open_in_memory().unwrap();
        let a = seed(&store, b"a");
        store
            .write(|tx| insert_plaintext(tx, &plain(a, "~path", "abc")))
            .unwrap();

        let hits = store
            .read(|c| find_items_by_plaintext_prefix(c, b"pw", "~path", "%"))
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_delete_for_item_clears_both_sets() {
        let store = ItemStore::open_in_memory().unwrap();
        let a = seed(&store, b"a");
        store
            .write(|tx| {
                insert_plaintext(tx, &plain(a, "~x", "1"))?;
                insert_encrypted(
                    tx,
                    &EncryptedTag {
                        item_id: a,
                        name: b"n".to_vec(),
                        value: b"v".to_vec(),
                    },
                )?;
                delete_for_item(tx, a)
            })
            .unwrap();

        assert!(store.read(|c| plaintext_for_item(c, a)).unwrap().is_empty());
        assert!(store.read(|c| encrypted_for_item(c, a)).unwrap().is_empty());
    }
}
