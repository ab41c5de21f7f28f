//! Backup header: the cleartext prefix that tells a reader how to re-derive
//! the backup key and walk the chunk stream.
//!
//! Binary layout, version 0 (little-endian):
//! ```text
//! u32      version          (= 0)
//! u32      argon2 mem_cost_kib
//! u32      argon2 time_cost
//! u32      argon2 parallelism
//! [u8; 32] kdf salt
//! [u8; 24] base nonce
//! u32      chunk_size
//! u64      created_at       (unix seconds)
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use sealkeep_core::{WalletError, WalletResult};
use sealkeep_crypto::{KdfParams, KeyDerivationData, MAX_CHUNK_SIZE, NONCE_SIZE, SALT_SIZE};

pub const BACKUP_VERSION: u32 = 0;

/// Upper bound on the encoded header accepted by readers.
pub const MAX_HEADER_LEN: usize = 4096;

const HEADER_LEN_V0: usize = 4 * 4 + SALT_SIZE + NONCE_SIZE + 4 + 8;

/// Argon2id cost ceilings for backup headers (4 GiB, 64 passes, 64 lanes).
/// The header is read before anything is authenticated, so its cost fields
/// must be bounded before they reach the KDF.
pub const MAX_KDF_MEM_KIB: u32 = 4 * 1024 * 1024;
pub const MAX_KDF_TIME_COST: u32 = 64;
pub const MAX_KDF_PARALLELISM: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub derivation: KeyDerivationData,
    pub nonce: [u8; NONCE_SIZE],
    pub chunk_size: u32,
    pub created_at: u64,
}

fn check_chunk_size(chunk_size: u32) -> WalletResult<()> {
    if chunk_size == 0 || chunk_size as usize > MAX_CHUNK_SIZE {
        return Err(WalletError::Format(format!(
            "chunk size {chunk_size} out of range 1..={MAX_CHUNK_SIZE}"
        )));
    }
    Ok(())
}

fn check_kdf_params(params: &KdfParams) -> WalletResult<()> {
    let limits = [
        ("mem_cost_kib", params.mem_cost_kib, MAX_KDF_MEM_KIB),
        ("time_cost", params.time_cost, MAX_KDF_TIME_COST),
        ("parallelism", params.parallelism, MAX_KDF_PARALLELISM),
    ];
    for (field, value, max) in limits {
        if value == 0 || value > max {
            return Err(WalletError::Format(format!(
                "kdf {field} {value} out of range 1..={max}"
            )));
        }
    }
    Ok(())
}

impl Header {
    /// New version-0 header with a random base nonce.
    pub fn new(derivation: KeyDerivationData, chunk_size: u32) -> WalletResult<Self> {
        check_chunk_size(chunk_size)?;
        check_kdf_params(&derivation.params)?;

        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Ok(Self {
            version: BACKUP_VERSION,
            derivation,
            nonce,
            chunk_size,
            created_at,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let params = &self.derivation.params;
        let mut out = Vec::with_capacity(HEADER_LEN_V0);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&params.mem_cost_kib.to_le_bytes());
        out.extend_from_slice(&params.time_cost.to_le_bytes());
        out.extend_from_slice(&params.parallelism.to_le_bytes());
        out.extend_from_slice(&self.derivation.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.chunk_size.to_le_bytes());
        out.extend_from_slice(&self.created_at.to_le_bytes());
        out
    }

    /// Parse a header. The version is checked before anything else is read.
    pub fn decode(bytes: &[u8]) -> WalletResult<Self> {
        let mut cursor = Cursor { bytes, pos: 0 };

        let version = cursor.u32()?;
        if version != BACKUP_VERSION {
            return Err(WalletError::UnsupportedVersion(version));
        }
        if bytes.len() != HEADER_LEN_V0 {
            return Err(WalletError::Format(format!(
                "header is {} bytes, expected {HEADER_LEN_V0}",
                bytes.len()
            )));
        }

        let params = KdfParams {
            mem_cost_kib: cursor.u32()?,
            time_cost: cursor.u32()?,
            parallelism: cursor.u32()?,
        };
        let salt = cursor.array::<SALT_SIZE>()?;
        let nonce = cursor.array::<NONCE_SIZE>()?;
        let chunk_size = cursor.u32()?;
        let created_at = u64::from_le_bytes(cursor.array::<8>()?);
        check_chunk_size(chunk_size)?;
        check_kdf_params(&params)?;

        Ok(Self {
            version,
            derivation: KeyDerivationData::new(salt, params),
            nonce,
            chunk_size,
            created_at,
        })
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn array<const N: usize>(&mut self) -> WalletResult<[u8; N]> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| WalletError::Format("header truncated".into()))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u32(&mut self) -> WalletResult<u32> {
        Ok(u32::from_le_bytes(self.array::<4>()?))
    }
}
