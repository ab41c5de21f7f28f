//! Record value encryption
//!
//! Encrypted value format (binary):
//! ```text
//! [24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! AAD = encrypted type || encrypted name
//! ```
//!
//! The cipher key is `HKDF-SHA256(salt = value_key, ikm = item_key)`, so a value
//! needs both the wallet's value key and the record's own (unwrapped) item key.
//! The AAD binds the value to its record, so swapping values between rows fails.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::keys::{hkdf_derive, ItemKey};
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

const VALUE_INFO: &[u8] = b"sealkeep-value";

fn value_cipher(value_key: &[u8; KEY_SIZE], item_key: &ItemKey) -> anyhow::Result<XChaCha20Poly1305> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    hkdf_derive(Some(&value_key[..]), item_key.as_bytes(), VALUE_INFO, &mut *key)?;
    Ok(XChaCha20Poly1305::new((&*key).into()))
}

/// Encrypt a record value.
///
/// - `value_key`: The wallet's value key
/// - `item_key`: The record's unwrapped item key
/// - `aad`: Encrypted type followed by encrypted name
///
/// Returns: `[24-byte nonce][ciphertext][16-byte tag]`
pub fn encrypt_value(
    value_key: &[u8; KEY_SIZE],
    item_key: &ItemKey,
    aad: &[u8],
    plaintext: &[u8],
) -> anyhow::Result<Vec<u8>> {
    let cipher = value_cipher(value_key, item_key)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|e| anyhow::anyhow!("value encryption failed: {e}"))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt a record value produced by `encrypt_value` with the same keys and AAD.
pub fn decrypt_value(
    value_key: &[u8; KEY_SIZE],
    item_key: &ItemKey,
    aad: &[u8],
    encrypted: &[u8],
) -> anyhow::Result<Vec<u8>> {
    if encrypted.len() < NONCE_SIZE + TAG_SIZE {
        anyhow::bail!(
            "encrypted value too short: {} bytes (minimum {})",
            encrypted.len(),
            NONCE_SIZE + TAG_SIZE
        );
    }

    let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = value_cipher(value_key, item_key)?;

    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad })
        .map_err(|_| anyhow::anyhow!("value decryption failed: wrong key or value moved to another record"))
}
