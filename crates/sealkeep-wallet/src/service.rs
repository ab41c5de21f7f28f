//! Wallet lifecycle: create the key metadata once, open (idempotent), close

use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sealkeep_core::config::{expand_tilde, SealkeepConfig};
use sealkeep_core::{TagPolicy, WalletError, WalletResult};
use sealkeep_crypto::{KdfParams, KeyDerivationData, Keys, SALT_SIZE};
use sealkeep_store::{metadata, ItemStore};

use crate::wallet::{crypto_err, Wallet};

const METADATA_VERSION: u32 = 1;

/// Persisted form of the key set: sealed keys plus everything needed to
/// re-derive the master key from the passphrase.
#[derive(Debug, Serialize, Deserialize)]
struct KeysMetadata {
    version: u32,
    /// Base64 of `Keys::seal` output
    keys: String,
    /// Base64 of the 32-byte KDF salt
    salt: String,
    kdf: KdfParams,
}

impl KeysMetadata {
    fn decode(bytes: &[u8]) -> WalletResult<Self> {
        let meta: Self = serde_json::from_slice(bytes)
            .map_err(|e| WalletError::Storage(format!("corrupt key metadata: {e}")))?;
        if meta.version != METADATA_VERSION {
            return Err(WalletError::Storage(format!(
                "unsupported key metadata version {}",
                meta.version
            )));
        }
        Ok(meta)
    }

    fn derivation(&self) -> WalletResult<KeyDerivationData> {
        let salt = STANDARD
            .decode(&self.salt)
            .map_err(|e| WalletError::Storage(format!("corrupt key metadata salt: {e}")))?;
        let salt: [u8; SALT_SIZE] = salt.try_into().map_err(|v: Vec<u8>| {
            WalletError::Storage(format!("key metadata salt has {} bytes", v.len()))
        })?;
        Ok(KeyDerivationData::new(salt, self.kdf))
    }

    fn sealed_keys(&self) -> WalletResult<Vec<u8>> {
        STANDARD
            .decode(&self.keys)
            .map_err(|e| WalletError::Storage(format!("corrupt sealed keys: {e}")))
    }
}

impl Wallet {
    /// Initialize a new wallet in `store`: fresh salt, fresh key set, one metadata row.
    ///
    /// Returns the wallet already open. Fails with `AlreadyInitialized` if the
    /// store has key metadata.
    pub fn create(
        store: ItemStore,
        passphrase: &SecretString,
        kdf: KdfParams,
        tags: TagPolicy,
    ) -> WalletResult<Self> {
        if store.read(metadata::get)?.is_some() {
            return Err(WalletError::AlreadyInitialized);
        }

        let derivation = KeyDerivationData::generate(kdf);
        let master = derivation.derive(passphrase).map_err(crypto_err)?;
        let keys = Keys::generate();

        let meta = KeysMetadata {
            version: METADATA_VERSION,
            keys: STANDARD.encode(keys.seal(&master).map_err(crypto_err)?),
            salt: STANDARD.encode(derivation.salt),
            kdf,
        };
        let encoded = serde_json::to_vec(&meta).map_err(|e| WalletError::Other(e.into()))?;
        store.write(|tx| metadata::create(tx, &encoded))?;

        info!("wallet created");
        Ok(Wallet::from_parts(store, keys, tags))
    }

    /// Unlock an existing wallet. A wrong passphrase fails here with `Crypto`.
    pub fn open(store: ItemStore, passphrase: &SecretString, tags: TagPolicy) -> WalletResult<Self> {
        let row = store
            .read(metadata::get)?
            .ok_or(WalletError::NotInitialized)?;
        let meta = KeysMetadata::decode(&row.value)?;

        let master = meta.derivation()?.derive(passphrase).map_err(crypto_err)?;
        let keys = Keys::open(&meta.sealed_keys()?, &master).map_err(crypto_err)?;

        info!("wallet opened");
        Ok(Wallet::from_parts(store, keys, tags))
    }
}

/// Owns the lifecycle of one wallet database. At most one open `Wallet`
/// exists per service; its keys are dropped on `close`.
#[derive(Debug)]
pub struct WalletService {
    db_path: PathBuf,
    tags: TagPolicy,
    wallet: Option<Arc<Wallet>>,
}

impl WalletService {
    pub fn new(db_path: impl Into<PathBuf>, tags: TagPolicy) -> Self {
        Self {
            db_path: db_path.into(),
            tags,
            wallet: None,
        }
    }

    pub fn from_config(config: &SealkeepConfig) -> Self {
        Self::new(expand_tilde(&config.wallet.db_path), config.tags.clone())
    }

    pub fn db_path(&self) -> &std::path::Path {
        &self.db_path
    }

    pub fn is_open(&self) -> bool {
        self.wallet.is_some()
    }

    fn open_store(&self) -> WalletResult<ItemStore> {
        if let Some(parent) = self.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(ItemStore::open(&self.db_path)?)
    }

    /// Create the wallet database and its key metadata, leaving the wallet open.
    pub fn create(&mut self, passphrase: &SecretString, kdf: KdfParams) -> WalletResult<Arc<Wallet>> {
        if self.wallet.is_some() {
            return Err(WalletError::AlreadyInitialized);
        }
        let wallet = Arc::new(Wallet::create(self.open_store()?, passphrase, kdf, self.tags.clone())?);
        self.wallet = Some(Arc::clone(&wallet));
        Ok(wallet)
    }

    /// Open the wallet. Calling again while open returns the same instance
    /// without re-deriving keys.
    pub fn open(&mut self, passphrase: &SecretString) -> WalletResult<Arc<Wallet>> {
        if let Some(wallet) = &self.wallet {
            return Ok(Arc::clone(wallet));
        }
        let wallet = Arc::new(Wallet::open(self.open_store()?, passphrase, self.tags.clone())?);
        self.wallet = Some(Arc::clone(&wallet));
        Ok(wallet)
    }

    /// The open wallet, or `NotOpen`.
    pub fn wallet(&self) -> WalletResult<Arc<Wallet>> {
        self.wallet.clone().ok_or(WalletError::NotOpen)
    }

    /// Forget the in-memory keys. Persisted rows are untouched. Keys are
    /// zeroized once every outstanding handle (e.g. a running export) is dropped.
    pub fn close(&mut self) {
        if let Some(wallet) = self.wallet.take() {
            if Arc::strong_count(&wallet) > 1 {
                warn!("closing wallet while other handles are still alive");
            }
            info!("wallet closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealkeep_core::WalletRecord;

    fn fast_kdf() -> KdfParams {
        KdfParams {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    fn pw(s: &str) -> SecretString {
        SecretString::from(s)
    }

    #[test]
    fn test_create_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.db");

        let mut service = WalletService::new(&path, TagPolicy::default());
        let wallet = service.create(&pw("pw"), fast_kdf()).unwrap();
        wallet
            .add_record(&WalletRecord::new("did", "abc", b"v1".to_vec()))
            .unwrap();
        drop(wallet);
        service.close();
        assert!(!service.is_open());

        let mut service = WalletService::new(&path, TagPolicy::default());
        let wallet = service.open(&pw("pw")).unwrap();
        assert_eq!(
            wallet.find_record("did", "abc").unwrap().unwrap().value,
            b"v1"
        );
    }

    #[test]
    fn test_open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = WalletService::new(dir.path().join("w.db"), TagPolicy::default());
        service.create(&pw("pw"), fast_kdf()).unwrap();

        let a = service.open(&pw("pw")).unwrap();
        // already open: the passphrase is not consulted again
        let b = service.open(&pw("not-even-checked")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_wrong_passphrase_fails_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.db");
        WalletService::new(&path, TagPolicy::default())
            .create(&pw("right"), fast_kdf())
            .unwrap();

        let mut service = WalletService::new(&path, TagPolicy::default());
        let err = service.open(&pw("wrong")).unwrap_err();
        assert!(matches!(err, WalletError::Crypto(_)), "unexpected error: {err}");
        assert!(!service.is_open());
    }

    #[test]
    fn test_create_twice_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.db");
        WalletService::new(&path, TagPolicy::default())
            .create(&pw("pw"), fast_kdf())
            .unwrap();
        let err = WalletService::new(&path, TagPolicy::default())
            .create(&pw("pw"), fast_kdf())
            .unwrap_err();
        assert!(matches!(err, WalletError::AlreadyInitialized));
    }

    #[test]
    fn test_open_uninitialized() {
        let err = Wallet::open(ItemStore::open_in_memory().unwrap(), &pw("pw"), TagPolicy::default())
            .unwrap_err();
        assert!(matches!(err, WalletError::NotInitialized));
    }

    #[test]
    fn test_closed_service_has_no_wallet() {
        let service = WalletService::new("/nonexistent/w.db", TagPolicy::default());
        assert!(matches!(service.wallet(), Err(WalletError::NotOpen)));
    }
}
