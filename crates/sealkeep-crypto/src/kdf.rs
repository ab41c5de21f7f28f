//! Key derivation: Argon2id passphrase + salt → master key

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{KEY_SIZE, SALT_SIZE};

/// 256-bit key from Argon2id. Keys the wallet's sealed key set, or a backup body.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_SIZE]);

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// Argon2id cost, stored next to every salt so old wallets and backups
/// re-derive with the parameters they were created under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Derive a 256-bit master key from a passphrase and salt using Argon2id.
///
/// The salt is 32 random bytes generated once per wallet (or per backup file)
/// and stored next to the data it protects; it does not need to be secret.
pub fn derive_master_key(
    passphrase: &SecretString,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> anyhow::Result<MasterKey> {
    if passphrase.expose_secret().is_empty() {
        anyhow::bail!("passphrase must not be empty");
    }

    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| anyhow::anyhow!("invalid Argon2id params: {e}"))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase.expose_secret().as_bytes(), salt, &mut key)
        .map_err(|e| anyhow::anyhow!("Argon2id KDF failed: {e}"))?;

    Ok(MasterKey::from_bytes(key))
}

/// Salt plus cost parameters: everything needed to re-derive a master key
/// from the passphrase. Persisted in wallet metadata and in backup headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDerivationData {
    pub salt: [u8; SALT_SIZE],
    pub params: KdfParams,
}

impl KeyDerivationData {
    /// Fresh random salt. Never reuse one across wallets or backups.
    pub fn generate(params: KdfParams) -> Self {
        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        Self { salt, params }
    }

    pub fn new(salt: [u8; SALT_SIZE], params: KdfParams) -> Self {
        Self { salt, params }
    }

    pub fn derive(&self, passphrase: &SecretString) -> anyhow::Result<MasterKey> {
        tracing::debug!(
            mem_cost_kib = self.params.mem_cost_kib,
            time_cost = self.params.time_cost,
            "deriving master key"
        );
        derive_master_key(passphrase, &self.salt, &self.params)
    }
}

#[cfg(test)]
pub(crate) fn fast_params() -> KdfParams {
    KdfParams {
        mem_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn test_kdf_deterministic() {
        let passphrase = SecretString::from("test-passphrase-123");
        let salt = [1u8; SALT_SIZE];
        let params = fast_params();

        let key1 = derive_master_key(&passphrase, &salt, &params).unwrap();
        let key2 = derive_master_key(&passphrase, &salt, &params).unwrap();

        assert_eq!(
            key1.as_bytes(),
            key2.as_bytes(),
            "KDF must be deterministic"
        );
    }

    #[test]
    fn test_kdf_different_passphrases() {
        let salt = [1u8; SALT_SIZE];
        let params = fast_params();

        let key1 = derive_master_key(&SecretString::from("passphrase-a"), &salt, &params).unwrap();
        let key2 = derive_master_key(&SecretString::from("passphrase-b"), &salt, &params).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_kdf_empty_passphrase_rejected() {
        let result = derive_master_key(&SecretString::from(""), &[0u8; SALT_SIZE], &fast_params());
        assert!(result.is_err());
    }

    #[test]
    fn test_kdf_invalid_params_rejected() {
        let params = KdfParams {
            mem_cost_kib: 1,
            time_cost: 1,
            parallelism: 1,
        };
        let result = derive_master_key(&SecretString::from("pw"), &[0u8; SALT_SIZE], &params);
        assert!(result.is_err(), "memory below 8 KiB per lane must fail");
    }

    #[test]
    fn test_derivation_data_fresh_salts() {
        let passphrase = SecretString::from("same-passphrase");
        let a = KeyDerivationData::generate(fast_params());
        let b = KeyDerivationData::generate(fast_params());

        assert_ne!(a.salt, b.salt);
        assert_ne!(
            a.derive(&passphrase).unwrap().as_bytes(),
            b.derive(&passphrase).unwrap().as_bytes(),
            "same passphrase with fresh salts must give unrelated keys"
        );
    }

    #[test]
    fn test_master_key_debug_redacted() {
        let key = MasterKey::from_bytes([7u8; KEY_SIZE]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains('7'));
    }
}
