//! Chunked XChaCha20-Poly1305 stream
//!
//! Sealed stream format (binary):
//! ```text
//! [chunk 0: chunk_size bytes of ciphertext + 16-byte tag]
//! [chunk 1: ...]
//! [last chunk: 1..=chunk_size bytes of ciphertext + 16-byte tag]
//! nonce(i) = base_nonce + i   (192-bit little-endian add)
//! ```
//!
//! Only the last chunk may be short. An empty plaintext produces no chunks at
//! all; callers that need end-of-stream detection frame their own payload.
//! A reordered or modified chunk fails authentication because the
//! nonce is bound to the chunk position.

use std::io::{self, Read, Write};

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroizing;

use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Largest accepted plaintext chunk size (16 MiB)
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// A sealed chunk failed authentication. Carried inside an
/// `io::Error` of kind `InvalidData` by [`Decrypter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("chunk {index} failed authentication: wrong key or corrupted data")]
pub struct ChunkAuthError {
    pub index: u64,
}

impl ChunkAuthError {
    /// Recover the authentication failure from an I/O error raised by a `Decrypter`.
    pub fn from_io(err: &io::Error) -> Option<&ChunkAuthError> {
        err.get_ref()?.downcast_ref::<ChunkAuthError>()
    }
}

/// Nonce for chunk `index`: `base + index` over the 24 nonce bytes, little-endian, wrapping.
pub fn chunk_nonce(base: &[u8; NONCE_SIZE], index: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = *base;
    let mut carry = index;
    for byte in nonce.iter_mut() {
        if carry == 0 {
            break;
        }
        let sum = u64::from(*byte) + (carry & 0xff);
        *byte = sum as u8;
        carry = (carry >> 8) + (sum >> 8);
    }
    nonce
}

fn check_chunk_size(chunk_size: usize) -> anyhow::Result<()> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        anyhow::bail!("chunk size {chunk_size} out of range 1..={MAX_CHUNK_SIZE}");
    }
    Ok(())
}

/// Streaming encrypter. Buffers at most one chunk of plaintext.
///
/// Call [`Encrypter::finish`] to seal the final chunk; dropping the encrypter
/// without finishing loses the buffered tail.
pub struct Encrypter<W: Write> {
    inner: W,
    cipher: XChaCha20Poly1305,
    base_nonce: [u8; NONCE_SIZE],
    chunk_size: usize,
    buf: Zeroizing<Vec<u8>>,
    index: u64,
}

impl<W: Write> Encrypter<W> {
    pub fn new(
        inner: W,
        key: &[u8; KEY_SIZE],
        base_nonce: [u8; NONCE_SIZE],
        chunk_size: usize,
    ) -> anyhow::Result<Self> {
        check_chunk_size(chunk_size)?;
        Ok(Self {
            inner,
            cipher: XChaCha20Poly1305::new(key.into()),
            base_nonce,
            chunk_size,
            buf: Zeroizing::new(Vec::with_capacity(chunk_size)),
            index: 0,
        })
    }

    /// Number of chunks sealed so far.
    pub fn chunks_written(&self) -> u64 {
        self.index
    }

    fn seal_chunk(&mut self) -> io::Result<()> {
        let nonce = chunk_nonce(&self.base_nonce, self.index);
        let sealed = self
            .cipher
            .encrypt(XNonce::from_slice(&nonce), self.buf.as_slice())
            .map_err(|e| io::Error::other(format!("chunk {} encryption failed: {e}", self.index)))?;
        self.inner.write_all(&sealed)?;
        self.buf.clear();
        self.index += 1;
        Ok(())
    }

    /// Seal any buffered plaintext as the final chunk and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        if !self.buf.is_empty() {
            self.seal_chunk()?;
        }
        self.inner.flush()?;
        tracing::trace!(chunks = self.index, "stream sealed");
        Ok(self.inner)
    }
}

impl<W: Write> Write for Encrypter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < data.len() {
            // a full buffer is sealed only once more data arrives, so the
            // final chunk is always left for finish()
            if self.buf.len() == self.chunk_size {
                self.seal_chunk()?;
            }
            let take = (self.chunk_size - self.buf.len()).min(data.len() - written);
            self.buf.extend_from_slice(&data[written..written + take]);
            written += take;
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Streaming decrypter. Authenticates each chunk before releasing any of its bytes.
pub struct Decrypter<R: Read> {
    inner: R,
    cipher: XChaCha20Poly1305,
    base_nonce: [u8; NONCE_SIZE],
    chunk_size: usize,
    sealed: Vec<u8>,
    plain: Zeroizing<Vec<u8>>,
    pos: usize,
    index: u64,
    done: bool,
}

impl<R: Read> Decrypter<R> {
    pub fn new(
        inner: R,
        key: &[u8; KEY_SIZE],
        base_nonce: [u8; NONCE_SIZE],
        chunk_size: usize,
    ) -> anyhow::Result<Self> {
        check_chunk_size(chunk_size)?;
        Ok(Self {
            inner,
            cipher: XChaCha20Poly1305::new(key.into()),
            base_nonce,
            chunk_size,
            sealed: vec![0u8; chunk_size + TAG_SIZE],
            plain: Zeroizing::new(Vec::new()),
            pos: 0,
            index: 0,
            done: false,
        })
    }

    /// Number of chunks authenticated so far.
    pub fn chunks_read(&self) -> u64 {
        self.index
    }

    /// Read one sealed block, stopping early only at end of input.
    fn read_block(&mut self) -> io::Result<usize> {
        let mut filled = 0;
        while filled < self.sealed.len() {
            match self.inner.read(&mut self.sealed[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn refill(&mut self) -> io::Result<bool> {
        if self.done {
            return Ok(false);
        }

        let n = self.read_block()?;
        if n == 0 {
            self.done = true;
            return Ok(false);
        }
        if n <= TAG_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("chunk {} truncated: {n} bytes", self.index),
            ));
        }
        if n < self.chunk_size + TAG_SIZE {
            self.done = true;
        }

        let nonce = chunk_nonce(&self.base_nonce, self.index);
        let plain = self
            .cipher
            .decrypt(XNonce::from_slice(&nonce), &self.sealed[..n])
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    ChunkAuthError { index: self.index },
                )
            })?;

        self.plain = Zeroizing::new(plain);
        self.pos = 0;
        self.index += 1;
        Ok(true)
    }
}

impl<R: Read> Read for Decrypter<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        while self.pos == self.plain.len() {
            if !self.refill()? {
                return Ok(0);
            }
        }
        let n = (self.plain.len() - self.pos).min(out.len());
        out[..n].copy_from_slice(&self.plain[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Seal a whole buffer in one call.
pub fn seal_all(
    key: &[u8; KEY_SIZE],
    base_nonce: [u8; NONCE_SIZE],
    chunk_size: usize,
    plaintext: &[u8],
) -> anyhow::Result<Vec<u8>> {
    let mut enc = Encrypter::new(Vec::new(), key, base_nonce, chunk_size)?;
    enc.write_all(plaintext)?;
    Ok(enc.finish()?)
}

/// Open a whole sealed buffer in one call.
pub fn open_all(
    key: &[u8; KEY_SIZE],
    base_nonce: [u8; NONCE_SIZE],
    chunk_size: usize,
    sealed: &[u8],
) -> anyhow::Result<Vec<u8>> {
    let mut dec = Decrypter::new(sealed, key, base_nonce, chunk_size)?;
    let mut plaintext = Vec::new();
    dec.read_to_end(&mut plaintext)?;
    Ok(plaintext)
}
