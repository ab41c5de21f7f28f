//! Encrypted backup files: header, chunked body codec, and the background
//! export/restore pipeline built on them.

pub mod codec;
pub mod header;
pub mod pipeline;

use std::path::PathBuf;

use secrecy::SecretString;
use sealkeep_core::config::SealkeepConfig;
use sealkeep_crypto::KdfParams;

pub use codec::{BackupReader, BackupWriter, MAX_RECORD_LEN};
pub use header::{Header, BACKUP_VERSION, MAX_HEADER_LEN};
pub use pipeline::{export, restore, Transfer, TransferEvent};

/// Default plaintext chunk size for backup bodies
pub const DEFAULT_CHUNK_SIZE: u32 = 1024;

/// Where a backup lives and how it is keyed.
///
/// The passphrase is independent of the wallet's own; each export derives a
/// fresh key from it under a new random salt.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub path: PathBuf,
    pub passphrase: SecretString,
    pub kdf: KdfParams,
    pub chunk_size: u32,
}

impl BackupConfig {
    pub fn new(path: impl Into<PathBuf>, passphrase: SecretString) -> Self {
        Self {
            path: path.into(),
            passphrase,
            kdf: KdfParams::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Take KDF cost and chunk size from the `[crypto]` and `[backup]` sections.
    pub fn from_config(
        config: &SealkeepConfig,
        path: impl Into<PathBuf>,
        passphrase: SecretString,
    ) -> Self {
        Self::new(path, passphrase)
            .with_kdf(KdfParams {
                mem_cost_kib: config.crypto.argon2_mem_cost_kib,
                time_cost: config.crypto.argon2_time_cost,
                parallelism: config.crypto.argon2_parallelism,
            })
            .with_chunk_size(config.backup.chunk_size)
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}
