//! sealkeep-wallet: encrypted, tag-indexed record wallet
//!
//! - [`Wallet`] maps records onto encrypted rows in a [`sealkeep_store::ItemStore`]
//! - [`WalletService`] owns the create / open / close lifecycle
//! - [`backup`] exports and restores the whole wallet through a chunked AEAD file

pub mod backup;
pub mod service;
pub mod wallet;

pub use backup::{export, restore, BackupConfig, Transfer, TransferEvent};
pub use service::WalletService;
pub use wallet::Wallet;
