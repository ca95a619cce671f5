//! cask-seal: sealed streaming containers.
//!
//! A sealed stream is compressed, then authenticated-encrypted, end to end:
//!
//! ```text
//! seal:  plaintext → zstd compress → chunk → ChaCha20-Poly1305 seal → sink
//! open:  source → parse frame → authenticate → zstd decompress → plaintext
//! ```
//!
//! Every container uses a fresh ephemeral content key, wrapped under a
//! long-term user key with XChaCha20-Poly1305 (random 192-bit nonce) and
//! stored in the envelope header next to the user key's id. Chunks of the
//! compressed stream are sealed with deterministic nonces derived from the
//! chunk index, the final chunk carries a sentinel marker, and the first
//! chunk's authentication covers the whole envelope header plus any
//! caller-supplied outer prefix. Truncation, reordering, and header or
//! prefix tampering all fail to open.
//!
//! ```
//! use cask_core::{Key, KeyId};
//! use cask_seal::{prepare, seal, SealOptions};
//! use std::io::{Read, Write};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let key = Key::generate(KeyId::from_label("backups-2026"));
//!
//! let mut writer = seal(Vec::new(), &key, b"MYFORMAT", SealOptions::default())?;
//! writer.write_all(b"hello sealed world")?;
//! let sealed = writer.finish()?;
//!
//! // the consumer reads its own outer prefix first, then hands it over
//! let mut source = &sealed[..];
//! let mut outer = [0u8; 8];
//! source.read_exact(&mut outer)?;
//!
//! let openable = prepare(source, &outer)?;
//! assert_eq!(openable.key_id(), key.id());
//!
//! let mut plaintext = Vec::new();
//! openable.open(&key)?.read_to_end(&mut plaintext)?;
//! assert_eq!(plaintext, b"hello sealed world");
//! # Ok(())
//! # }
//! ```

pub mod format;

mod decrypt;
mod encap;
mod encrypt;
mod open;
mod seal;

pub use open::{prepare, Openable, SealReader};
pub use seal::{seal, SealOptions, SealWriter};

// Convenience re-exports so most callers only need this crate.
pub use cask_core::{CaskError, CaskResult, Key, KeyId};
pub use format::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
