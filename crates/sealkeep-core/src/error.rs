use thiserror::Error;

pub type WalletResult<T> = Result<T, WalletError>;

#[derive(Debug, Error)]
pub enum WalletError {
    /// A record with the same (type, name) is already stored.
    #[error("record already exists: {record_type}/{name}")]
    PreexistingEntity { record_type: String, name: String },

    #[error("record not found: {record_type}/{name}")]
    NotFound { record_type: String, name: String },

    #[error("wallet already initialized")]
    AlreadyInitialized,

    #[error("wallet not initialized: no key metadata in database")]
    NotInitialized,

    #[error("wallet is not open")]
    NotOpen,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// AEAD authentication failure or a wrong passphrase.
    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("unsupported backup version {0} (expected 0)")]
    UnsupportedVersion(u32),

    #[error("backup integrity check failed: header hash does not match body")]
    IntegrityMismatch,

    #[error("malformed backup: {0}")]
    Format(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WalletError {
    pub fn preexisting(record_type: &str, name: &str) -> Self {
        WalletError::PreexistingEntity {
            record_type: record_type.to_string(),
            name: name.to_string(),
        }
    }

    pub fn not_found(record_type: &str, name: &str) -> Self {
        WalletError::NotFound {
            record_type: record_type.to_string(),
            name: name.to_string(),
        }
    }

    /// The caller can recover by picking another name or updating instead.
    pub fn is_conflict(&self) -> bool {
        matches!(self, WalletError::PreexistingEntity { .. })
    }
}
