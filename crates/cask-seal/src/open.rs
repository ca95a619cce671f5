//! Opening: header parsing, key lookup hand-off, and the plaintext reader.

use std::io::{self, BufReader, Read};

use cask_core::{CaskError, CaskResult, Key, KeyId, ID_SIZE, KEY_SIZE};
use chacha20poly1305::{aead::KeyInit, ChaCha20Poly1305};
use tracing::debug;
use zeroize::Zeroize;
use zstd::stream::read::Decoder;

use crate::decrypt::Decryptor;
use crate::encap::decapsulate;
use crate::format::{
    ENCAPSULATED_SIZE, HEADER_SIZE, MAX_CHUNK_SIZE, OFF_CHUNK_SIZE, OFF_ENC_KEY, OFF_KEY_ID,
    OFF_VERSION, VERSION,
};

/// Parses a sealed stream's envelope header and prepares to open it.
///
/// The caller reads (and recognizes) its own outer prefix from the source
/// first, then passes those bytes here; `prepare` reads only the envelope
/// header. The returned [`Openable`] exposes the key id so the caller can
/// look up the matching [`Key`] before committing to decryption.
pub fn prepare<R: Read>(mut source: R, outer_prefix: &[u8]) -> CaskResult<Openable<R>> {
    let mut prefix = vec![0u8; outer_prefix.len() + HEADER_SIZE];
    prefix[..outer_prefix.len()].copy_from_slice(outer_prefix);
    source
        .read_exact(&mut prefix[outer_prefix.len()..])
        .map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => CaskError::Truncated,
            _ => CaskError::Io(e),
        })?;

    let header = &prefix[outer_prefix.len()..];
    let version = u32::from_le_bytes(
        header[OFF_VERSION..OFF_VERSION + 4]
            .try_into()
            .expect("version field is 4 bytes"),
    );
    if version != VERSION {
        return Err(CaskError::UnsupportedVersion(version));
    }

    let chunk_size = u32::from_le_bytes(
        header[OFF_CHUNK_SIZE..OFF_CHUNK_SIZE + 4]
            .try_into()
            .expect("chunk size field is 4 bytes"),
    );
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(CaskError::ChunkSizeTooLarge(chunk_size));
    }

    let mut key_id = [0u8; ID_SIZE];
    key_id.copy_from_slice(&header[OFF_KEY_ID..OFF_KEY_ID + ID_SIZE]);
    let mut encapsulated = [0u8; ENCAPSULATED_SIZE];
    encapsulated.copy_from_slice(&header[OFF_ENC_KEY..HEADER_SIZE]);

    debug!(chunk_size, "prepared sealed stream");

    Ok(Openable {
        source,
        prefix,
        chunk_size,
        key_id: KeyId::from_bytes(key_id),
        encapsulated,
    })
}

/// A parsed envelope header, ready to be opened once the caller has looked
/// up the key matching [`Openable::key_id`]. Nothing has been
/// authenticated yet; a wrong or tampered header only surfaces in
/// [`Openable::open`].
pub struct Openable<R: Read> {
    source: R,
    /// outer prefix ‖ raw header bytes; frame 0's AAD.
    prefix: Vec<u8>,
    chunk_size: u32,
    key_id: KeyId,
    encapsulated: [u8; ENCAPSULATED_SIZE],
}

impl<R: Read> Openable<R> {
    /// The id of the user key this stream was sealed for.
    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    /// Recovers the ephemeral key and authenticates the first chunk against
    /// the composite prefix before returning the reader, so header or
    /// prefix tampering fails here rather than surfacing partial plaintext.
    pub fn open(self, key: &Key) -> CaskResult<SealReader<R>> {
        let mut ephemeral = [0u8; KEY_SIZE];
        decapsulate(key.secret(), &self.encapsulated, &mut ephemeral)?;
        let aead = ChaCha20Poly1305::new(&ephemeral.into());
        ephemeral.zeroize();

        let mut decryptor = Decryptor::new(self.source, self.chunk_size as usize, aead);
        decryptor.pull(&self.prefix)?;

        let decompressor = Decoder::new(decryptor).map_err(CaskError::Io)?;
        debug!("opened sealed stream");
        Ok(SealReader { decompressor })
    }
}

/// Streaming plaintext reader over an opened stream. Reads return the
/// original bytes in order and end with a normal EOF after the final
/// chunk; any authentication or framing failure surfaces as an error and
/// sticks for every later read.
pub struct SealReader<R: Read> {
    decompressor: Decoder<'static, BufReader<Decryptor<R>>>,
}

impl<R: Read> std::fmt::Debug for SealReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealReader").finish_non_exhaustive()
    }
}

impl<R: Read> Read for SealReader<R> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        self.decompressor.read(dst)
    }
}
