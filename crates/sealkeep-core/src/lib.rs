//! sealkeep-core: shared record types, config schema, and error taxonomy

pub mod config;
pub mod error;
pub mod types;

pub use error::{WalletError, WalletResult};
pub use types::{TagCategory, TagPolicy, WalletRecord};
