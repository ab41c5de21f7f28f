//! Key hierarchy: the wallet's flat key set, per-item keys, key wrapping

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::kdf::MasterKey;
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// A per-item 256-bit encryption key. Zeroized on drop.
#[derive(Clone)]
pub struct ItemKey {
    bytes: [u8; KEY_SIZE],
}

impl ItemKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ItemKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit item key.
pub fn generate_item_key() -> ItemKey {
    ItemKey::from_bytes(random_key())
}

fn random_key() -> [u8; KEY_SIZE] {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// HKDF-SHA256 key derivation with an optional salt and a domain-specific info string.
pub(crate) fn hkdf_derive(
    salt: Option<&[u8]>,
    ikm: &[u8],
    info: &[u8],
    okm: &mut [u8],
) -> anyhow::Result<()> {
    let hkdf = Hkdf::<Sha256>::new(salt, ikm);
    hkdf.expand(info, okm)
        .map_err(|e| anyhow::anyhow!("HKDF expand failed: {e}"))
}

/// Seal `plaintext` under `key` with XChaCha20-Poly1305 and a random nonce.
///
/// Output: `[24-byte nonce][ciphertext + 16-byte tag]`
fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow::anyhow!("key sealing failed: {e}"))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

fn open(key: &[u8; KEY_SIZE], sealed: &[u8], expected_len: usize) -> anyhow::Result<Zeroizing<Vec<u8>>> {
    if sealed.len() != NONCE_SIZE + expected_len + TAG_SIZE {
        anyhow::bail!(
            "sealed key material has wrong size: {} bytes (expected {})",
            sealed.len(),
            NONCE_SIZE + expected_len + TAG_SIZE
        );
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = XChaCha20Poly1305::new(key.into());

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| anyhow::anyhow!("key unwrapping failed: wrong key or corrupted data"))?;
    Ok(Zeroizing::new(plaintext))
}

/// Wrap (encrypt) an item key under the wallet's item-wrap key.
pub fn wrap_key(wrap_key: &[u8; KEY_SIZE], item_key: &ItemKey) -> anyhow::Result<Vec<u8>> {
    seal(wrap_key, item_key.as_bytes())
}

/// Unwrap (decrypt) an item key. Input is the output of `wrap_key`.
pub fn unwrap_key(wrap_key: &[u8; KEY_SIZE], wrapped: &[u8]) -> anyhow::Result<ItemKey> {
    let plaintext = open(wrap_key, wrapped, KEY_SIZE)?;
    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    Ok(ItemKey::from_bytes(key_bytes))
}

const KEY_COUNT: usize = 6;

/// The wallet's flat key set. One independent random key per field category;
/// categories are never subdivided further, so this is a set and not a tree.
#[derive(Clone)]
pub struct Keys {
    pub type_key: [u8; KEY_SIZE],
    pub name_key: [u8; KEY_SIZE],
    pub value_key: [u8; KEY_SIZE],
    pub item_wrap_key: [u8; KEY_SIZE],
    pub tag_name_key: [u8; KEY_SIZE],
    pub tag_value_key: [u8; KEY_SIZE],
}

impl Keys {
    /// Fresh random key set for a new wallet.
    pub fn generate() -> Self {
        Self {
            type_key: random_key(),
            name_key: random_key(),
            value_key: random_key(),
            item_wrap_key: random_key(),
            tag_name_key: random_key(),
            tag_value_key: random_key(),
        }
    }

    fn as_array(&self) -> [&[u8; KEY_SIZE]; KEY_COUNT] {
        [
            &self.type_key,
            &self.name_key,
            &self.value_key,
            &self.item_wrap_key,
            &self.tag_name_key,
            &self.tag_value_key,
        ]
    }

    /// Encrypt the key set under the master key for storage in wallet metadata.
    pub fn seal(&self, master: &MasterKey) -> anyhow::Result<Vec<u8>> {
        let mut flat = Zeroizing::new(Vec::with_capacity(KEY_COUNT * KEY_SIZE));
        for key in self.as_array() {
            flat.extend_from_slice(key);
        }
        seal(master.as_bytes(), &flat)
    }

    /// Inverse of `seal`. A wrong master key (wrong passphrase) fails here.
    pub fn open(sealed: &[u8], master: &MasterKey) -> anyhow::Result<Self> {
        let flat = open(master.as_bytes(), sealed, KEY_COUNT * KEY_SIZE)
            .map_err(|_| anyhow::anyhow!("cannot open wallet keys: wrong passphrase or corrupted metadata"))?;

        let mut slots = [[0u8; KEY_SIZE]; KEY_COUNT];
        for (slot, chunk) in slots.iter_mut().zip(flat.chunks_exact(KEY_SIZE)) {
            slot.copy_from_slice(chunk);
        }
        let keys = Self {
            type_key: slots[0],
            name_key: slots[1],
            value_key: slots[2],
            item_wrap_key: slots[3],
            tag_name_key: slots[4],
            tag_value_key: slots[5],
        };
        slots.zeroize();
        Ok(keys)
    }
}

impl Drop for Keys {
    fn drop(&mut self) {
        self.type_key.zeroize();
        self.name_key.zeroize();
        self.value_key.zeroize();
        self.item_wrap_key.zeroize();
        self.tag_name_key.zeroize();
        self.tag_value_key.zeroize();
    }
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_master_key() -> MasterKey {
        MasterKey::from_bytes([42u8; KEY_SIZE])
    }

    #[test]
    fn test_item_key_generation() {
        let k1 = generate_item_key();
        let k2 = generate_item_key();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_key_wrap_unwrap_roundtrip() {
        let wrap = [9u8; KEY_SIZE];
        let item_key = generate_item_key();

        let wrapped = wrap_key(&wrap, &item_key).unwrap();
        let unwrapped = unwrap_key(&wrap, &wrapped).unwrap();

        assert_eq!(item_key.as_bytes(), unwrapped.as_bytes());
        // nonce (24) + key (32) + tag (16) = 72
        assert_eq!(wrapped.len(), NONCE_SIZE + KEY_SIZE + TAG_SIZE);
    }

    #[test]
    fn test_key_unwrap_wrong_wrap_key() {
        let item_key = generate_item_key();
        let wrapped = wrap_key(&[1u8; KEY_SIZE], &item_key).unwrap();

        assert!(unwrap_key(&[2u8; KEY_SIZE], &wrapped).is_err());
    }

    #[test]
    fn test_key_unwrap_truncated() {
        let wrapped = wrap_key(&[1u8; KEY_SIZE], &generate_item_key()).unwrap();
        assert!(unwrap_key(&[1u8; KEY_SIZE], &wrapped[..wrapped.len() - 1]).is_err());
    }

    #[test]
    fn test_keys_are_independent() {
        let keys = Keys::generate();
        let all = keys.as_array();
        for i in 0..all.len() {
            for j in (i + 1)..all.len() {
                assert_ne!(all[i], all[j], "category keys {i} and {j} collide");
            }
        }
    }

    #[test]
    fn test_keys_seal_open_roundtrip() {
        let master = test_master_key();
        let keys = Keys::generate();

        let sealed = keys.seal(&master).unwrap();
        let opened = Keys::open(&sealed, &master).unwrap();

        assert_eq!(opened.type_key, keys.type_key);
        assert_eq!(opened.item_wrap_key, keys.item_wrap_key);
        assert_eq!(opened.tag_value_key, keys.tag_value_key);
    }

    #[test]
    fn test_keys_open_wrong_master() {
        let sealed = Keys::generate().seal(&MasterKey::from_bytes([1u8; KEY_SIZE])).unwrap();
        let result = Keys::open(&sealed, &MasterKey::from_bytes([2u8; KEY_SIZE]));

        let err = result.unwrap_err().to_string();
        assert!(err.contains("wrong passphrase"), "unexpected error: {err}");
    }

    #[test]
    fn test_hkdf_different_domains() {
        let mut a = [0u8; KEY_SIZE];
        let mut b = [0u8; KEY_SIZE];
        hkdf_derive(None, &[3u8; KEY_SIZE], b"sealkeep-a", &mut a).unwrap();
        hkdf_derive(None, &[3u8; KEY_SIZE], b"sealkeep-b", &mut b).unwrap();

        assert_ne!(a, b, "different domains must produce different keys");
    }
}
