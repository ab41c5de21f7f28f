use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{StoreError, StoreResult};
use crate::models::Metadata;

pub fn get(conn: &Connection) -> StoreResult<Option<Metadata>> {
    let value = conn
        .query_row("SELECT value FROM metadata WHERE id = 1", [], |row| {
            row.get::<_, Vec<u8>>(0)
        })
        .optional()?;
    Ok(value.map(|value| Metadata { value }))
}

/// Write the metadata row. Refuses if the wallet already has one.
pub fn create(conn: &Connection, value: &[u8]) -> StoreResult<()> {
    if get(conn)?.is_some() {
        return Err(StoreError::MetadataExists);
    }
    conn.execute(
        "INSERT INTO metadata (id, value) VALUES (1, ?1)",
        params![value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ItemStore;

    #[test]
    fn test_create_once() {
        let store = ItemStore::open_in_memory().unwrap();
        assert!(store.read(get).unwrap().is_none());

        store.write(|tx| create(tx, b"sealed-keys")).unwrap();
        assert_eq!(store.read(get).unwrap().unwrap().value, b"sealed-keys");

        let err = store.write(|tx| create(tx, b"other")).unwrap_err();
        assert!(matches!(err, StoreError::MetadataExists));
        assert_eq!(store.read(get).unwrap().unwrap().value, b"sealed-keys");
    }
}
