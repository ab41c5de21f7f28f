//! Backup stream codec
//!
//! File:  `u32-LE header_len || header || sealed chunks`
//! Body (the plaintext inside the chunks):
//! ```text
//! [32 bytes: SHA-256(header bytes)]
//! { u32-LE len || record bytes }*
//! u32-LE 0
//! ```
//!
//! Both ends stream: memory stays bounded by one chunk plus one record.

use std::io::{self, Read, Write};

use secrecy::SecretString;
use sealkeep_core::{WalletError, WalletResult};
use sealkeep_crypto::{sha256, ChunkAuthError, Decrypter, Encrypter, MasterKey, HASH_SIZE};
use tracing::debug;

use super::header::{Header, MAX_HEADER_LEN};
use crate::wallet::crypto_err;

/// Largest single record accepted in a backup (64 MiB)
pub const MAX_RECORD_LEN: usize = 64 * 1024 * 1024;

/// Map a body read failure onto the wallet error taxonomy.
fn body_err(err: io::Error) -> WalletError {
    if ChunkAuthError::from_io(&err).is_some() {
        return WalletError::Crypto(err.to_string());
    }
    match err.kind() {
        io::ErrorKind::UnexpectedEof => {
            WalletError::Format("backup body ends before the terminator".into())
        }
        io::ErrorKind::InvalidData => WalletError::Format(err.to_string()),
        _ => WalletError::Io(err),
    }
}

fn read_prefix<R: Read>(input: &mut R, buf: &mut [u8], what: &str) -> WalletResult<()> {
    input.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => WalletError::Format(format!("backup truncated in {what}")),
        _ => WalletError::Io(e),
    })
}

/// Writes one backup: header in the clear, then the sealed body.
pub struct BackupWriter<W: Write> {
    body: Encrypter<W>,
    records: u64,
}

impl<W: Write> BackupWriter<W> {
    /// Write the header and start the body. `master` must be derived from
    /// `header.derivation`.
    pub fn new(mut out: W, header: &Header, master: &MasterKey) -> WalletResult<Self> {
        let header_bytes = header.encode();
        out.write_all(&(header_bytes.len() as u32).to_le_bytes())?;
        out.write_all(&header_bytes)?;

        let mut body = Encrypter::new(
            out,
            master.as_bytes(),
            header.nonce,
            header.chunk_size as usize,
        )
        .map_err(crypto_err)?;
        body.write_all(&sha256(&header_bytes))?;

        Ok(Self { body, records: 0 })
    }

    /// Frame and write one serialized record. Empty records cannot be framed
    /// because a zero length is the terminator.
    pub fn write_record(&mut self, record: &[u8]) -> WalletResult<()> {
        if record.is_empty() {
            return Err(WalletError::Format("cannot frame an empty record".into()));
        }
        if record.len() > MAX_RECORD_LEN {
            return Err(WalletError::Format(format!(
                "record of {} bytes exceeds the {MAX_RECORD_LEN} byte limit",
                record.len()
            )));
        }
        self.body.write_all(&(record.len() as u32).to_le_bytes())?;
        self.body.write_all(record)?;
        self.records += 1;
        Ok(())
    }

    /// Write the terminator, seal the last chunk, and hand back the writer.
    pub fn finish(mut self) -> WalletResult<W> {
        self.body.write_all(&0u32.to_le_bytes())?;
        let chunks = self.body.chunks_written();
        let out = self.body.finish()?;
        debug!(records = self.records, chunks = chunks + 1, "backup body sealed");
        Ok(out)
    }
}

/// Reads one backup, yielding record bytes in file order.
pub struct BackupReader<R: Read> {
    body: Decrypter<R>,
    header: Header,
    done: bool,
}

impl<R: Read> BackupReader<R> {
    /// Parse the header, re-derive the backup key from `passphrase`, and
    /// verify the header hash at the head of the body.
    ///
    /// A wrong passphrase fails here, on the first chunk, with `Crypto`.
    pub fn open(mut input: R, passphrase: &SecretString) -> WalletResult<Self> {
        let mut len = [0u8; 4];
        read_prefix(&mut input, &mut len, "header length")?;
        let header_len = u32::from_le_bytes(len) as usize;
        if header_len > MAX_HEADER_LEN {
            return Err(WalletError::Format(format!(
                "header length {header_len} exceeds {MAX_HEADER_LEN}"
            )));
        }

        let mut header_bytes = vec![0u8; header_len];
        read_prefix(&mut input, &mut header_bytes, "header")?;
        let header = Header::decode(&header_bytes)?;

        let master = header.derivation.derive(passphrase).map_err(crypto_err)?;
        let mut body = Decrypter::new(
            input,
            master.as_bytes(),
            header.nonce,
            header.chunk_size as usize,
        )
        .map_err(|e| WalletError::Format(format!("{e:#}")))?;

        let mut hash = [0u8; HASH_SIZE];
        body.read_exact(&mut hash).map_err(body_err)?;
        if hash != sha256(&header_bytes) {
            return Err(WalletError::IntegrityMismatch);
        }

        Ok(Self {
            body,
            header,
            done: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Next record, or `None` after the terminator. The terminator must be
    /// the last thing in the body.
    pub fn next_record(&mut self) -> WalletResult<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }

        let mut len = [0u8; 4];
        self.body.read_exact(&mut len).map_err(body_err)?;
        let len = u32::from_le_bytes(len) as usize;

        if len == 0 {
            self.done = true;
            let mut trailing = [0u8; 1];
            if self.body.read(&mut trailing).map_err(body_err)? != 0 {
                return Err(WalletError::Format("data after the record terminator".into()));
            }
            return Ok(None);
        }
        if len > MAX_RECORD_LEN {
            return Err(WalletError::Format(format!(
                "record length {len} exceeds the {MAX_RECORD_LEN} byte limit"
            )));
        }

        let mut record = vec![0u8; len];
        self.body.read_exact(&mut record).map_err(body_err)?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sealkeep_crypto::{KdfParams, KeyDerivationData, TAG_SIZE};

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

    fn write_backup(passphrase: &str, chunk_size: u32, records: &[&[u8]]) -> Vec<u8> {
        let derivation = KeyDerivationData::generate(fast_kdf());
        let master = derivation.derive(&pw(passphrase)).unwrap();
        let header = Header::new(derivation, chunk_size).unwrap();
        write_with(&header, &master, records)
    }

    fn write_with(header: &Header, master: &MasterKey, records: &[&[u8]]) -> Vec<u8> {
        let mut writer = BackupWriter::new(Vec::new(), header, master).unwrap();
        for record in records {
            writer.write_record(record).unwrap();
        }
        writer.finish().unwrap()
    }

    fn read_all(bytes: &[u8], passphrase: &str) -> WalletResult<Vec<Vec<u8>>> {
        let mut reader = BackupReader::open(bytes, &pw(passphrase))?;
        let mut out = Vec::new();
        while let Some(record) = reader.next_record()? {
            out.push(record);
        }
        Ok(out)
    }

    fn body_offset(bytes: &[u8]) -> usize {
        4 + u32::from_le_bytes(bytes[..4].try_into().unwrap()) as usize
    }

    #[test]
    fn test_roundtrip() {
        let records: [&[u8]; 3] = [b"first", b"second record", b"3"];
        let bytes = write_backup("pw", 16, &records);

        assert_eq!(read_all(&bytes, "pw").unwrap(), records.map(|r| r.to_vec()));
    }

    #[test]
    fn test_empty_backup_is_valid() {
        let bytes = write_backup("pw", 1024, &[]);
        assert!(read_all(&bytes, "pw").unwrap().is_empty());
    }

    #[test]
    fn test_body_lengths_around_chunk_size() {
        // body = 32 hash + (4 + record) + 4 terminator
        let chunk = 64usize;
        for body_len in [chunk - 1, chunk, chunk + 1, 2 * chunk] {
            let record = vec![0xAB; body_len - 40];
            let bytes = write_backup("pw", chunk as u32, &[&record]);

            let sealed = bytes.len() - body_offset(&bytes);
            assert_eq!(sealed, body_len + body_len.div_ceil(chunk) * TAG_SIZE);
            assert_eq!(read_all(&bytes, "pw").unwrap(), vec![record]);
        }
    }

    #[test]
    fn test_wrong_passphrase_is_crypto_error() {
        let bytes = write_backup("pw", 64, &[b"secret"]);
        assert!(matches!(read_all(&bytes, "wrong"), Err(WalletError::Crypto(_))));
    }

    #[test]
    fn test_any_body_byte_flip_detected() {
        let bytes = write_backup("pw", 32, &[b"alpha", b"beta", b"gamma-delta-epsilon"]);
        for i in body_offset(&bytes)..bytes.len() {
            let mut tampered = bytes.clone();
            tampered[i] ^= 0x80;
            assert!(
                matches!(read_all(&tampered, "pw"), Err(WalletError::Crypto(_))),
                "flip at {i} not detected as authentication failure"
            );
        }
    }

    #[test]
    fn test_header_substitution_detected() {
        // Same key material, different header bytes: only the hash binding catches it.
        let derivation = KeyDerivationData::generate(fast_kdf());
        let master = derivation.derive(&pw("pw")).unwrap();
        let header_a = Header::new(derivation, 64).unwrap();
        let mut header_b = header_a.clone();
        header_b.created_at += 1;

        let a = write_with(&header_a, &master, &[b"record"]);
        let b = write_with(&header_b, &master, &[b"record"]);

        let mut spliced = b[..body_offset(&b)].to_vec();
        spliced.extend_from_slice(&a[body_offset(&a)..]);

        assert!(matches!(read_all(&spliced, "pw"), Err(WalletError::IntegrityMismatch)));
    }

    #[test]
    fn test_foreign_header_fails() {
        let a = write_backup("pw", 64, &[b"a"]);
        let b = write_backup("pw", 64, &[b"b"]);

        let mut spliced = b[..body_offset(&b)].to_vec();
        spliced.extend_from_slice(&a[body_offset(&a)..]);

        assert!(read_all(&spliced, "pw").is_err());
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = write_backup("pw", 64, &[b"a"]);
        bytes[4..8].copy_from_slice(&1u32.to_le_bytes());
        assert!(matches!(
            read_all(&bytes, "pw"),
            Err(WalletError::UnsupportedVersion(1))
        ));
    }

    #[test]
    fn test_missing_terminator() {
        let derivation = KeyDerivationData::generate(fast_kdf());
        let master = derivation.derive(&pw("pw")).unwrap();
        let header = Header::new(derivation, 64).unwrap();

        // hand-build a body with one record and no terminator
        let header_bytes = header.encode();
        let mut out = (header_bytes.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(&header_bytes);
        let mut body = Encrypter::new(out, master.as_bytes(), header.nonce, 64).unwrap();
        body.write_all(&sha256(&header_bytes)).unwrap();
        body.write_all(&3u32.to_le_bytes()).unwrap();
        body.write_all(b"abc").unwrap();
        let bytes = body.finish().unwrap();

        let err = read_all(&bytes, "pw").unwrap_err();
        assert!(matches!(err, WalletError::Format(_)), "unexpected error: {err}");
    }

    #[test]
    fn test_excessive_kdf_cost_rejected_before_derivation() {
        let mut bytes = write_backup("pw", 64, &[b"a"]);
        // length prefix, version, mem_cost_kib, then time_cost
        bytes[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(read_all(&bytes, "pw"), Err(WalletError::Format(_))));
    }

    #[test]
    fn test_oversized_header_length() {
        let mut bytes = write_backup("pw", 64, &[]);
        bytes[..4].copy_from_slice(&(MAX_HEADER_LEN as u32 + 1).to_le_bytes());
        assert!(matches!(read_all(&bytes, "pw"), Err(WalletError::Format(_))));
    }

    #[test]
    fn test_truncated_file() {
        let bytes = write_backup("pw", 64, &[b"a"]);
        assert!(matches!(read_all(&bytes[..2], "pw"), Err(WalletError::Format(_))));
        assert!(matches!(read_all(&bytes[..20], "pw"), Err(WalletError::Format(_))));
    }

    #[test]
    fn test_empty_record_rejected() {
        let derivation = KeyDerivationData::generate(fast_kdf());
        let master = derivation.derive(&pw("pw")).unwrap();
        let header = Header::new(derivation, 64).unwrap();
        let mut writer = BackupWriter::new(Vec::new(), &header, &master).unwrap();

        assert!(matches!(writer.write_record(b""), Err(WalletError::Format(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_records_survive_and_chunk_truncation_fails(
            records in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..200), 0..8),
            chunk_size in 1u32..128,
        ) {
            let refs: Vec<&[u8]> = records.iter().map(Vec::as_slice).collect();
            let bytes = write_backup("pw", chunk_size, &refs);
            prop_assert_eq!(read_all(&bytes, "pw").unwrap(), records);

            // dropping whole trailing chunks loses the terminator
            let sealed_chunk = chunk_size as usize + TAG_SIZE;
            let mut cut = body_offset(&bytes) + sealed_chunk;
            while cut < bytes.len() {
                prop_assert!(read_all(&bytes[..cut], "pw").is_err());
                cut += sealed_chunk;
            }
        }
    }
}
