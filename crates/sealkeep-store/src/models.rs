//! Row types. Byte fields hold ciphertext; the store never sees plaintext
//! except in `PlaintextTag`.

use rusqlite::Row;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: i64,
    pub record_type: Vec<u8>,
    pub name: Vec<u8>,
    pub value: Vec<u8>,
    /// Per-item key, wrapped under the wallet's item-wrap key
    pub key: Vec<u8>,
}

impl Item {
    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            record_type: row.get("type")?,
            name: row.get("name")?,
            value: row.get("value")?,
            key: row.get("key")?,
        })
    }
}

/// Input for inserting an item; the id is assigned by the store.
#[derive(Debug, Clone, Copy)]
pub struct NewItem<'a> {
    pub record_type: &'a [u8],
    pub name: &'a [u8],
    pub value: &'a [u8],
    pub key: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedTag {
    pub item_id: i64,
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl EncryptedTag {
    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            item_id: row.get("item_id")?,
            name: row.get("name")?,
            value: row.get("value")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaintextTag {
    pub item_id: i64,
    pub name: String,
    pub value: String,
}

impl PlaintextTag {
    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            item_id: row.get("item_id")?,
            name: row.get("name")?,
            value: row.get("value")?,
        })
    }
}

/// The single metadata row: the sealed key set plus KDF inputs, serialized by the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub value: Vec<u8>,
}
