//! Sealing: draws the ephemeral key, wraps it under the user key, and
//! composes the zstd compressor over the chunking encryptor.

use std::io::{self, Write};

use cask_core::{CaskError, CaskResult, Key, KEY_SIZE};
use chacha20poly1305::{aead::KeyInit, ChaCha20Poly1305};
use rand::{rngs::OsRng, RngCore};
use tracing::debug;
use zstd::stream::write::Encoder;

use crate::encap::encapsulate;
use crate::encrypt::Encryptor;
use crate::format::{
    DEFAULT_CHUNK_SIZE, ENCAPSULATED_SIZE, HEADER_SIZE, MAX_CHUNK_SIZE, VERSION, XNONCE_SIZE,
};

/// Configuration consumed once at seal start.
#[derive(Default)]
pub struct SealOptions {
    /// Plaintext bytes per chunk, measured after compression. Zero selects
    /// [`DEFAULT_CHUNK_SIZE`]; values above [`MAX_CHUNK_SIZE`] are rejected.
    pub chunk_size: u32,
    /// Accepted for API compatibility; the encoder currently always runs at
    /// the zstd default level so equal inputs yield equal streams.
    pub level: i32,
    /// Source of randomness for the wrap nonce and the ephemeral key.
    /// `None` uses the operating system RNG; any replacement must be
    /// cryptographically secure.
    pub rng: Option<Box<dyn RngCore>>,
}

/// Starts sealing a stream into `sink`. Callers that want an outer prefix
/// in front of the envelope pass it here rather than writing it themselves:
/// the sealer emits it and binds it into the first chunk's authentication.
///
/// The returned writer accepts plaintext via [`Write`] and MUST be closed
/// with [`SealWriter::finish`] to produce a valid container.
pub fn seal<W: Write>(
    sink: W,
    key: &Key,
    outer_prefix: &[u8],
    mut options: SealOptions,
) -> CaskResult<SealWriter<W>> {
    let chunk_size = match options.chunk_size {
        0 => DEFAULT_CHUNK_SIZE,
        n if n > MAX_CHUNK_SIZE => return Err(CaskError::ChunkSizeTooLarge(n)),
        n => n,
    };

    let mut encapsulated = [0u8; ENCAPSULATED_SIZE];
    match &mut options.rng {
        Some(rng) => rng.fill_bytes(&mut encapsulated[..XNONCE_SIZE + KEY_SIZE]),
        None => OsRng.fill_bytes(&mut encapsulated[..XNONCE_SIZE + KEY_SIZE]),
    }

    let ephemeral: &[u8; KEY_SIZE] = encapsulated[XNONCE_SIZE..XNONCE_SIZE + KEY_SIZE]
        .try_into()
        .expect("ephemeral key region is KEY_SIZE bytes");
    let aead = ChaCha20Poly1305::new(ephemeral.into());

    // overwrites the plaintext ephemeral key with its sealed form; only the
    // cipher's key schedule retains it, and that is wiped on drop
    encapsulate(key.secret(), &mut encapsulated);

    let mut prefix = Vec::with_capacity(outer_prefix.len() + HEADER_SIZE);
    prefix.extend_from_slice(outer_prefix);
    prefix.extend_from_slice(&VERSION.to_le_bytes());
    prefix.extend_from_slice(&chunk_size.to_le_bytes());
    prefix.extend_from_slice(key.id().as_bytes());
    prefix.extend_from_slice(&encapsulated);

    debug!(key_id = ?key.id(), chunk_size, "sealing stream");

    let encryptor = Encryptor::new(sink, chunk_size as usize, aead, prefix);
    let compressor = Encoder::new(encryptor, 0).map_err(CaskError::Io)?;

    Ok(SealWriter {
        compressor: Some(compressor),
    })
}

/// Streaming sealer. Bytes written are compressed, chunked, and sealed to
/// the sink; nothing reaches the sink until the compressor produces output
/// or [`SealWriter::finish`] runs.
pub struct SealWriter<W: Write> {
    compressor: Option<Encoder<'static, Encryptor<W>>>,
}

impl<W: Write> SealWriter<W> {
    /// Flushes the compressor's terminal block, emits the final chunk, and
    /// returns the sink. Mandatory: a stream that was never finished has no
    /// final chunk and openers reject it. Finishing twice, or writing after
    /// a finish, fails with [`CaskError::AlreadyClosed`].
    pub fn finish(&mut self) -> CaskResult<W> {
        let compressor = self.compressor.take().ok_or(CaskError::AlreadyClosed)?;
        let encryptor = compressor.finish().map_err(CaskError::from_io)?;
        let sink = encryptor.finish().map_err(CaskError::from_io)?;
        debug!("stream sealed");
        Ok(sink)
    }
}

impl<W: Write> Write for SealWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match &mut self.compressor {
            Some(compressor) => compressor.write(data),
            None => Err(CaskError::AlreadyClosed.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.compressor {
            Some(compressor) => compressor.flush(),
            None => Err(CaskError::AlreadyClosed.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cask_core::KeyId;

    fn test_key() -> Key {
        Key::new(KeyId::from_label("unit"), [0x11; KEY_SIZE])
    }

    #[test]
    fn rejects_oversized_chunks() {
        let err = seal(
            Vec::new(),
            &test_key(),
            b"",
            SealOptions {
                chunk_size: MAX_CHUNK_SIZE + 1,
                ..Default::default()
            },
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            CaskError::ChunkSizeTooLarge(n) if n == MAX_CHUNK_SIZE + 1
        ));
    }

    #[test]
    fn double_finish_reports_closed() {
        let mut writer = seal(Vec::new(), &test_key(), b"", SealOptions::default()).unwrap();
        writer.finish().unwrap();
        assert!(matches!(writer.finish(), Err(CaskError::AlreadyClosed)));
    }

    #[test]
    fn write_after_finish_reports_closed() {
        let mut writer = seal(Vec::new(), &test_key(), b"", SealOptions::default()).unwrap();
        writer.finish().unwrap();
        let err = writer.write(b"late").unwrap_err();
        assert!(matches!(
            CaskError::from_io(err),
            CaskError::AlreadyClosed
        ));
    }

    #[test]
    fn empty_stream_layout() {
        let key = test_key();
        let mut writer = seal(Vec::new(), &key, b"OUTER!", SealOptions::default()).unwrap();
        let sealed = writer.finish().unwrap();

        assert_eq!(&sealed[..6], b"OUTER!");
        // version 0, default chunk size, then the key id
        assert_eq!(&sealed[6..10], &[0, 0, 0, 0]);
        assert_eq!(&sealed[10..14], &DEFAULT_CHUNK_SIZE.to_le_bytes());
        assert_eq!(&sealed[14..46], key.id().as_bytes());
        // a finished empty stream still carries at least one sealed frame
        assert!(sealed.len() > 6 + HEADER_SIZE);
    }
}
