use sha2::{Digest, Sha256};

use crate::HASH_SIZE;

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; HASH_SIZE] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&digest);
    out
}
