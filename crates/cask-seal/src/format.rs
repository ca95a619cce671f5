//! Envelope and chunk frame layout.
//!
//! Envelope header (little-endian, written once, after any caller-owned
//! prefix):
//! ```text
//! [4: version = 0][4: chunk_size][32: key id][72: encapsulated key]
//! ```
//! The encapsulated key is `[24: XChaCha nonce][32: ciphertext][16: tag]`.
//!
//! Each chunk frame is `[4: header index][ciphertext ‖ 16: tag]`. The
//! header index is the zero-based chunk index for ordinary frames and
//! [`FINAL_CHUNK_INDEX`] for the one final frame that closes the stream.

use cask_core::{ID_SIZE, KEY_SIZE};

/// ChaCha20-Poly1305 nonce length used for chunk sealing.
pub const NONCE_SIZE: usize = 12;

/// XChaCha20-Poly1305 nonce length used for key encapsulation.
pub const XNONCE_SIZE: usize = 24;

/// Poly1305 authentication tag length.
pub const TAG_SIZE: usize = 16;

/// Size of an encapsulated ephemeral key: nonce ‖ ciphertext ‖ tag.
pub const ENCAPSULATED_SIZE: usize = XNONCE_SIZE + KEY_SIZE + TAG_SIZE;

/// Container format version written into every envelope header.
pub const VERSION: u32 = 0;

/// Envelope header size in bytes.
pub const HEADER_SIZE: usize = 8 + ID_SIZE + ENCAPSULATED_SIZE;

pub(crate) const OFF_VERSION: usize = 0;
pub(crate) const OFF_CHUNK_SIZE: usize = OFF_VERSION + 4;
pub(crate) const OFF_KEY_ID: usize = OFF_CHUNK_SIZE + 4;
pub(crate) const OFF_ENC_KEY: usize = OFF_KEY_ID + ID_SIZE;

/// Chunk frame header size: one little-endian u32.
pub const CHUNK_HEADER_SIZE: usize = 4;

/// Header index marking the final frame of a stream.
pub const FINAL_CHUNK_INDEX: u32 = 0xffff_ffff;

/// Chunk size used when `SealOptions::chunk_size` is zero.
pub const DEFAULT_CHUNK_SIZE: u32 = 32 * 1024;

/// Largest chunk size the sealer emits and the opener accepts. Bounds the
/// opener's buffer allocation when reading untrusted containers.
pub const MAX_CHUNK_SIZE: u32 = 1024 * 1024;

pub(crate) type ChunkNonce = [u8; NONCE_SIZE];

/// Derives a chunk nonce: little-endian true index in bytes 0..4, zero
/// filler, final-frame marker in the last byte. A final and a non-final
/// frame at the same index never share a nonce.
pub(crate) fn chunk_nonce(index: u32, is_final: bool) -> ChunkNonce {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..4].copy_from_slice(&index.to_le_bytes());
    if is_final {
        nonce[NONCE_SIZE - 1] = 1;
    }
    nonce
}
