//! Chunking decryptor: parses and authenticates frames, one at a time.

use std::cmp::min;
use std::io::{self, Read};

use cask_core::CaskError;
use chacha20poly1305::{aead::AeadInPlace, ChaCha20Poly1305, Nonce, Tag};

use crate::format::{chunk_nonce, CHUNK_HEADER_SIZE, FINAL_CHUNK_INDEX, TAG_SIZE};

/// Failure memory for the terminal error state: once any frame fails,
/// every later read reports the same kind of error and no plaintext from
/// later frames is ever surfaced.
#[derive(Clone, Copy)]
enum Poison {
    Auth,
    Truncated,
    OutOfOrder { expected: u32, found: u32 },
    Io(io::ErrorKind),
}

impl Poison {
    fn of(err: &CaskError) -> Self {
        match err {
            CaskError::Truncated => Poison::Truncated,
            CaskError::OutOfOrder { expected, found } => Poison::OutOfOrder {
                expected: *expected,
                found: *found,
            },
            CaskError::Io(io_err) => Poison::Io(io_err.kind()),
            _ => Poison::Auth,
        }
    }

    fn to_error(self) -> CaskError {
        match self {
            Poison::Auth => CaskError::AuthFailed,
            Poison::Truncated => CaskError::Truncated,
            Poison::OutOfOrder { expected, found } => CaskError::OutOfOrder { expected, found },
            Poison::Io(kind) => CaskError::Io(kind.into()),
        }
    }
}

/// Sits under the zstd decoder and above the caller's source. Buffers are
/// sized once from the header's chunk_size (already bounds-checked by
/// `prepare`), so steady-state reads allocate nothing.
pub(crate) struct Decryptor<R: Read> {
    source: R,
    /// Frame intake: header ‖ ciphertext ‖ tag.
    read_buf: Vec<u8>,
    plain: Vec<u8>,
    pos: usize,
    end: usize,
    next_index: u32,
    aead: ChaCha20Poly1305,
    eof: bool,
    failed: Option<Poison>,
}

impl<R: Read> Decryptor<R> {
    pub(crate) fn new(source: R, chunk_size: usize, aead: ChaCha20Poly1305) -> Self {
        Self {
            source,
            read_buf: vec![0u8; CHUNK_HEADER_SIZE + chunk_size + TAG_SIZE],
            plain: vec![0u8; chunk_size],
            pos: 0,
            end: 0,
            next_index: 0,
            aead,
            eof: false,
            failed: None,
        }
    }

    /// Reads and authenticates the next frame. `aad` is the composite
    /// prefix for frame 0 and empty afterwards. The first failure passes
    /// through unchanged; its kind is remembered for every later read.
    pub(crate) fn pull(&mut self, aad: &[u8]) -> Result<(), CaskError> {
        match self.try_pull(aad) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.failed = Some(Poison::of(&err));
                Err(err)
            }
        }
    }

    fn try_pull(&mut self, aad: &[u8]) -> Result<(), CaskError> {
        let n = read_up_to(&mut self.source, &mut self.read_buf)?;
        // a short read is fine for the final frame, but anything below a
        // header plus a tag cannot be a frame at all
        if n < CHUNK_HEADER_SIZE + TAG_SIZE {
            return Err(CaskError::Truncated);
        }

        let header_index = u32::from_le_bytes(
            self.read_buf[..CHUNK_HEADER_SIZE]
                .try_into()
                .expect("chunk header is 4 bytes"),
        );
        let is_final = header_index == FINAL_CHUNK_INDEX;
        if !is_final && header_index != self.next_index {
            return Err(CaskError::OutOfOrder {
                expected: self.next_index,
                found: header_index,
            });
        }

        let nonce: Nonce = chunk_nonce(self.next_index, is_final).into();
        let body_len = n - CHUNK_HEADER_SIZE - TAG_SIZE;
        self.plain[..body_len]
            .copy_from_slice(&self.read_buf[CHUNK_HEADER_SIZE..CHUNK_HEADER_SIZE + body_len]);
        let tag = Tag::from_slice(&self.read_buf[n - TAG_SIZE..n]);

        if self
            .aead
            .decrypt_in_place_detached(&nonce, aad, &mut self.plain[..body_len], tag)
            .is_err()
        {
            self.plain[..body_len].fill(0);
            return Err(CaskError::AuthFailed);
        }

        self.pos = 0;
        self.end = body_len;
        self.eof = is_final;
        self.next_index = self.next_index.wrapping_add(1);
        Ok(())
    }
}

impl<R: Read> Read for Decryptor<R> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if let Some(poison) = self.failed {
            return Err(poison.to_error().into());
        }
        if self.pos == self.end && !self.eof {
            self.pull(&[])?;
        }
        let take = min(dst.len(), self.end - self.pos);
        dst[..take].copy_from_slice(&self.plain[self.pos..self.pos + take]);
        self.pos += take;
        Ok(take)
    }
}

/// Fills `buf` as far as possible, stopping early only at EOF. Retries
/// `Interrupted`.
fn read_up_to(reader: &mut impl Read, mut buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while !buf.is_empty() {
        match reader.read(buf) {
            Ok(0) => break,
            Ok(n) => {
                total += n;
                buf = &mut buf[n..];
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
