//! AES-SIV deterministic field encryption
//!
//! Item type, item name, and encrypted tag names/values must produce the same
//! ciphertext for the same plaintext so the store can index and compare them
//! without holding keys. AES-SIV gives that with authentication.

use aes_siv::{
    aead::{Aead, KeyInit},
    Aes256SivAead, Nonce,
};
use zeroize::Zeroizing;

use crate::keys::hkdf_derive;
use crate::KEY_SIZE;

const SIV_INFO: &[u8] = b"sealkeep-field-aes-siv";

fn cipher_for(key: &[u8; KEY_SIZE]) -> anyhow::Result<Aes256SivAead> {
    // AES-256-SIV takes a 64-byte key (MAC half + CTR half)
    let mut double_key = Zeroizing::new([0u8; 64]);
    hkdf_derive(None, key, SIV_INFO, &mut *double_key)?;
    Aes256SivAead::new_from_slice(&*double_key)
        .map_err(|e| anyhow::anyhow!("invalid AES-SIV key: {e}"))
}

/// Encrypt a field with AES-256-SIV. Same key + plaintext always gives the same output.
///
/// Output is the 16-byte synthetic IV followed by the ciphertext.
pub fn encrypt_deterministic(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
    let cipher = cipher_for(key)?;
    cipher
        .encrypt(&Nonce::default(), plaintext)
        .map_err(|e| anyhow::anyhow!("field encryption failed: {e}"))
}

pub fn decrypt_deterministic(key: &[u8; KEY_SIZE], ciphertext: &[u8]) -> anyhow::Result<Vec<u8>> {
    let cipher = cipher_for(key)?;
    cipher
        .decrypt(&Nonce::default(), ciphertext)
        .map_err(|_| anyhow::anyhow!("field decryption failed: wrong key or corrupted data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_field_key() -> [u8; KEY_SIZE] {
        [0x55u8; KEY_SIZE]
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_field_key();

        let encrypted = encrypt_deterministic(&key, b"password").unwrap();
        let decrypted = decrypt_deterministic(&key, &encrypted).unwrap();

        assert_eq!(decrypted, b"password");
    }

    #[test]
    fn test_deterministic_encryption() {
        let key = test_field_key();

        let enc1 = encrypt_deterministic(&key, b"github").unwrap();
        let enc2 = encrypt_deterministic(&key, b"github").unwrap();

        assert_eq!(enc1, enc2, "AES-SIV must be deterministic");
    }

    #[test]
    fn test_different_plaintexts_different_ciphertext() {
        let key = test_field_key();

        let enc1 = encrypt_deterministic(&key, b"github").unwrap();
        let enc2 = encrypt_deterministic(&key, b"gitlab").unwrap();

        assert_ne!(enc1, enc2);
    }

    #[test]
    fn test_different_keys_different_ciphertext() {
        let enc1 = encrypt_deterministic(&[0x11u8; KEY_SIZE], b"same").unwrap();
        let enc2 = encrypt_deterministic(&[0x22u8; KEY_SIZE], b"same").unwrap();

        assert_ne!(enc1, enc2);
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let encrypted = encrypt_deterministic(&[0x11u8; KEY_SIZE], b"secret").unwrap();
        assert!(decrypt_deterministic(&[0x22u8; KEY_SIZE], &encrypted).is_err());
    }

    #[test]
    fn test_empty_field() {
        let key = test_field_key();
        let encrypted = encrypt_deterministic(&key, b"").unwrap();

        assert_eq!(encrypted.len(), 16, "empty field is just the synthetic IV");
        assert_eq!(decrypt_deterministic(&key, &encrypted).unwrap(), b"");
    }

    #[test]
    fn test_tampered_field() {
        let key = test_field_key();
        let mut encrypted = encrypt_deterministic(&key, b"tag-value").unwrap();
        encrypted[0] ^= 0x01;

        assert!(decrypt_deterministic(&key, &encrypted).is_err());
    }
}
