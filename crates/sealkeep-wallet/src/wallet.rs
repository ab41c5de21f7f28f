//! Wallet: maps logical records onto encrypted item and tag rows

use std::collections::BTreeMap;

use sealkeep_core::{TagCategory, TagPolicy, WalletError, WalletRecord, WalletResult};
use sealkeep_crypto::{
    decrypt_deterministic, decrypt_value, encrypt_deterministic, encrypt_value,
    generate_item_key, unwrap_key, wrap_key, Keys, KEY_SIZE,
};
use sealkeep_store::{
    items, tags, Connection, EncryptedTag, Item, ItemStore, NewItem, PlaintextTag, StoreError,
};
use tracing::debug;

pub(crate) fn crypto_err(err: anyhow::Error) -> WalletError {
    WalletError::Crypto(format!("{err:#}"))
}

/// An open wallet. Holds the unsealed key set for as long as it lives;
/// dropping the last handle zeroizes the keys.
///
/// All operations are synchronous and serialize on the store's single connection.
pub struct Wallet {
    store: ItemStore,
    keys: Keys,
    tags: TagPolicy,
}

impl Wallet {
    pub(crate) fn from_parts(store: ItemStore, keys: Keys, tags: TagPolicy) -> Self {
        Self { store, keys, tags }
    }

    pub fn tag_policy(&self) -> &TagPolicy {
        &self.tags
    }

    /// Insert a record with its tags in one transaction.
    ///
    /// Fails with `PreexistingEntity` if a record with the same type and name exists.
    pub fn add_record(&self, record: &WalletRecord) -> WalletResult<i64> {
        let id = self.store.write(|tx| self.insert_record(tx, record))?;
        debug!(id, "record added");
        Ok(id)
    }

    pub fn find_record(&self, record_type: &str, name: &str) -> WalletResult<Option<WalletRecord>> {
        let enc_type = self.seal_field(&self.keys.type_key, record_type)?;
        let enc_name = self.seal_field(&self.keys.name_key, name)?;

        self.store.read(|conn| {
            items::find(conn, &enc_type, &enc_name)?
                .map(|item| self.open_item(conn, &item))
                .transpose()
        })
    }

    pub fn find_records(&self, record_type: &str) -> WalletResult<Vec<WalletRecord>> {
        let enc_type = self.seal_field(&self.keys.type_key, record_type)?;
        self.store.read(|conn| {
            let found = items::find_by_type(conn, &enc_type)?;
            self.open_items(conn, &found)
        })
    }

    /// Decrypt every record in the wallet, in insertion order.
    pub fn find_all_records(&self) -> WalletResult<Vec<WalletRecord>> {
        self.store.read(|conn| {
            let found = items::all(conn)?;
            self.open_items(conn, &found)
        })
    }

    /// Number of records. Touches no key material.
    pub fn count(&self) -> WalletResult<u64> {
        Ok(self.store.read(items::count)?)
    }

    /// Replace the value and both tag sets of an existing record.
    pub fn update_record(&self, record: &WalletRecord) -> WalletResult<()> {
        let enc_type = self.seal_field(&self.keys.type_key, &record.record_type)?;
        let enc_name = self.seal_field(&self.keys.name_key, &record.name)?;

        self.store.write(|tx| {
            let item = items::find(tx, &enc_type, &enc_name)?
                .ok_or_else(|| WalletError::not_found(&record.record_type, &record.name))?;

            let (value, key) = self.seal_value(&enc_type, &enc_name, &record.value)?;
            items::update_value(tx, item.id, &value, &key)?;
            tags::delete_for_item(tx, item.id)?;
            self.write_tags(tx, item.id, &record.tags)
        })?;
        debug!("record updated");
        Ok(())
    }

    /// Delete a record; its tag rows are cascade-deleted with it.
    pub fn delete_record(&self, record_type: &str, name: &str) -> WalletResult<()> {
        let enc_type = self.seal_field(&self.keys.type_key, record_type)?;
        let enc_name = self.seal_field(&self.keys.name_key, name)?;

        self.store.write(|tx| {
            let item = items::find(tx, &enc_type, &enc_name)?
                .ok_or_else(|| WalletError::not_found(record_type, name))?;
            items::delete(tx, item.id)?;
            Ok(())
        })
    }

    /// Records of `record_type` whose tag `tag_name` equals `tag_value`.
    /// Works for both tag categories.
    pub fn find_by_tag(
        &self,
        record_type: &str,
        tag_name: &str,
        tag_value: &str,
    ) -> WalletResult<Vec<WalletRecord>> {
        let enc_type = self.seal_field(&self.keys.type_key, record_type)?;

        match self.tags.category(tag_name) {
            TagCategory::Plaintext => self.store.read(|conn| {
                let found = tags::find_items_by_plaintext(conn, &enc_type, tag_name, tag_value)?;
                self.open_items(conn, &found)
            }),
            TagCategory::Encrypted => {
                let enc_name = self.seal_field(&self.keys.tag_name_key, tag_name)?;
                let enc_value = self.seal_field(&self.keys.tag_value_key, tag_value)?;
                self.store.read(|conn| {
                    let found = tags::find_items_by_encrypted(conn, &enc_type, &enc_name, &enc_value)?;
                    self.open_items(conn, &found)
                })
            }
        }
    }

    /// Records of `record_type` whose plaintext tag `tag_name` starts with `prefix`.
    /// Encrypted tags only support equality, so they yield `InvalidQuery`.
    pub fn find_by_tag_prefix(
        &self,
        record_type: &str,
        tag_name: &str,
        prefix: &str,
    ) -> WalletResult<Vec<WalletRecord>> {
        if self.tags.category(tag_name) == TagCategory::Encrypted {
            return Err(WalletError::InvalidQuery(format!(
                "prefix search on encrypted tag {tag_name:?}"
            )));
        }
        let enc_type = self.seal_field(&self.keys.type_key, record_type)?;
        self.store.read(|conn| {
            let found = tags::find_items_by_plaintext_prefix(conn, &enc_type, tag_name, prefix)?;
            self.open_items(conn, &found)
        })
    }

    /// Run `f` inside one store transaction.
    pub(crate) fn transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> WalletResult<T>,
    ) -> WalletResult<T> {
        self.store.write(|tx| f(tx))
    }

    /// Insert a record on an open connection or transaction.
    pub(crate) fn insert_record(&self, conn: &Connection, record: &WalletRecord) -> WalletResult<i64> {
        let enc_type = self.seal_field(&self.keys.type_key, &record.record_type)?;
        let enc_name = self.seal_field(&self.keys.name_key, &record.name)?;
        let (value, key) = self.seal_value(&enc_type, &enc_name, &record.value)?;

        let id = items::insert(
            conn,
            NewItem {
                record_type: &enc_type,
                name: &enc_name,
                value: &value,
                key: &key,
            },
        )
        .map_err(|e| match e {
            StoreError::Conflict => WalletError::preexisting(&record.record_type, &record.name),
            other => other.into(),
        })?;

        self.write_tags(conn, id, &record.tags)?;
        Ok(id)
    }

    fn write_tags(
        &self,
        conn: &Connection,
        item_id: i64,
        record_tags: &BTreeMap<String, String>,
    ) -> WalletResult<()> {
        for (name, value) in record_tags {
            match self.tags.category(name) {
                TagCategory::Plaintext => tags::insert_plaintext(
                    conn,
                    &PlaintextTag {
                        item_id,
                        name: name.clone(),
                        value: value.clone(),
                    },
                )?,
                TagCategory::Encrypted => tags::insert_encrypted(
                    conn,
                    &EncryptedTag {
                        item_id,
                        name: self.seal_field(&self.keys.tag_name_key, name)?,
                        value: self.seal_field(&self.keys.tag_value_key, value)?,
                    },
                )?,
            }
        }
        Ok(())
    }

    fn seal_field(&self, key: &[u8; KEY_SIZE], plaintext: &str) -> WalletResult<Vec<u8>> {
        encrypt_deterministic(key, plaintext.as_bytes()).map_err(crypto_err)
    }

    fn open_field(&self, key: &[u8; KEY_SIZE], ciphertext: &[u8]) -> WalletResult<String> {
        let bytes = decrypt_deterministic(key, ciphertext).map_err(crypto_err)?;
        String::from_utf8(bytes)
            .map_err(|_| WalletError::Crypto("decrypted field is not valid UTF-8".into()))
    }

    /// Encrypt a value under a fresh item key. Returns `(value, wrapped_key)`.
    fn seal_value(&self, enc_type: &[u8], enc_name: &[u8], value: &[u8]) -> WalletResult<(Vec<u8>, Vec<u8>)> {
        let item_key = generate_item_key();
        let aad = [enc_type, enc_name].concat();
        let sealed = encrypt_value(&self.keys.value_key, &item_key, &aad, value).map_err(crypto_err)?;
        let wrapped = wrap_key(&self.keys.item_wrap_key, &item_key).map_err(crypto_err)?;
        Ok((sealed, wrapped))
    }

    fn open_items(&self, conn: &Connection, found: &[Item]) -> WalletResult<Vec<WalletRecord>> {
        found.iter().map(|item| self.open_item(conn, item)).collect()
    }

    fn open_item(&self, conn: &Connection, item: &Item) -> WalletResult<WalletRecord> {
        let record_type = self.open_field(&self.keys.type_key, &item.record_type)?;
        let name = self.open_field(&self.keys.name_key, &item.name)?;

        let item_key = unwrap_key(&self.keys.item_wrap_key, &item.key).map_err(crypto_err)?;
        let aad = [item.record_type.as_slice(), item.name.as_slice()].concat();
        let value = decrypt_value(&self.keys.value_key, &item_key, &aad, &item.value).map_err(crypto_err)?;

        let mut record_tags = BTreeMap::new();
        for tag in tags::encrypted_for_item(conn, item.id)? {
            record_tags.insert(
                self.open_field(&self.keys.tag_name_key, &tag.name)?,
                self.open_field(&self.keys.tag_value_key, &tag.value)?,
            );
        }
        for tag in tags::plaintext_for_item(conn, item.id)? {
            record_tags.insert(tag.name, tag.value);
        }

        Ok(WalletRecord {
            record_type,
            name,
            value,
            tags: record_tags,
        })
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("store", &self.store)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}
