//! User key material: a long-term secret plus the opaque id the host
//! application uses to locate it in its own key store.

use std::fmt;

use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

/// Length of a ChaCha20-Poly1305 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Length of a user-defined key id in bytes.
pub const ID_SIZE: usize = 32;

/// Opaque 32-byte key identifier. Any byte pattern is legal; the codec
/// carries it verbatim and never interprets it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId([u8; ID_SIZE]);

impl KeyId {
    pub const fn from_bytes(bytes: [u8; ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds an id from a short label, NUL-padded to the full width.
    /// Labels longer than [`ID_SIZE`] bytes are cut off.
    pub fn from_label(label: &str) -> Self {
        let mut bytes = [0u8; ID_SIZE];
        let n = label.len().min(ID_SIZE);
        bytes[..n].copy_from_slice(&label.as_bytes()[..n]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId(")?;
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

/// A long-term user key. Each sealing operation uses it once, to wrap a
/// fresh ephemeral content key. Key bytes must come from a CSPRNG; NIST
/// recommends limiting a single key to no more than 2^32 seal operations.
///
/// The secret is wiped on drop and never shown by `Debug`.
#[derive(Clone)]
pub struct Key {
    id: KeyId,
    secret: [u8; KEY_SIZE],
}

impl Key {
    pub fn new(id: KeyId, secret: [u8; KEY_SIZE]) -> Self {
        Self { id, secret }
    }

    /// Generates a key with a fresh random secret from the OS RNG.
    pub fn generate(id: KeyId) -> Self {
        let mut secret = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut secret);
        Self { id, secret }
    }

    pub fn id(&self) -> &KeyId {
        &self.id
    }

    pub fn secret(&self) -> &[u8; KEY_SIZE] {
        &self.secret
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("id", &self.id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
