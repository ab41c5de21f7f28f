use sealkeep_core::WalletError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique index on (type, name) rejected the row.
    #[error("an item with the same type and name already exists")]
    Conflict,

    #[error("wallet metadata already exists")]
    MetadataExists,

    #[error("unsupported store schema version {found} (this build supports up to {supported})")]
    SchemaVersion { found: i64, supported: i64 },

    #[error("store lock poisoned")]
    Poisoned,

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Classify a rusqlite error, turning unique-index violations into `Conflict`.
    pub(crate) fn from_insert(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                StoreError::Conflict
            }
            _ => StoreError::Sqlite(err),
        }
    }
}

impl From<StoreError> for WalletError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MetadataExists => WalletError::AlreadyInitialized,
            other => WalletError::Storage(other.to_string()),
        }
    }
}
