//! sealkeep-crypto: key hierarchy and ciphers for the sealkeep wallet
//!
//! Key hierarchy:
//! ```text
//! Master Key (256-bit, Argon2id from passphrase + 32-byte salt)
//!   └── Keys (flat set of random 256-bit keys, sealed under the master key)
//!         ├── type_key, name_key          AES-256-SIV, deterministic (indexable)
//!         ├── tag_name_key, tag_value_key AES-256-SIV, deterministic (equality search)
//!         ├── item_wrap_key               wraps each per-item key
//!         └── value_key                   HKDF salt for per-item value keys
//!
//! Item Key (per record, random) ── HKDF(value_key) ──> XChaCha20-Poly1305 over the value
//! ```
//!
//! Backups re-derive an independent master key from the export passphrase and
//! a fresh salt, then seal the body as a stream of fixed-size chunks
//! (XChaCha20-Poly1305, nonce = base nonce + chunk index).

pub mod hash;
pub mod kdf;
pub mod keys;
pub mod siv;
pub mod stream;
pub mod value;

pub use hash::sha256;
pub use kdf::{derive_master_key, KdfParams, KeyDerivationData, MasterKey};
pub use keys::{generate_item_key, unwrap_key, wrap_key, ItemKey, Keys};
pub use siv::{decrypt_deterministic, encrypt_deterministic};
pub use stream::{open_all, seal_all, ChunkAuthError, Decrypter, Encrypter, MAX_CHUNK_SIZE};
pub use value::{decrypt_value, encrypt_value};

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the KDF salt (one AEAD key length)
pub const SALT_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of a SHA-256 digest
pub const HASH_SIZE: usize = 32;
