//! Encapsulation of the per-container ephemeral key under the user key.
//!
//! XChaCha20-Poly1305 with a random 192-bit nonce, empty AAD. The wrapped
//! blob is fixed-size (`[24: nonce][32: ciphertext][16: tag]`) and lives in
//! the envelope header; on its own it reveals nothing about the content key.

use cask_core::{CaskError, CaskResult, KEY_SIZE};
use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    Tag, XChaCha20Poly1305, XNonce,
};

use crate::format::{ENCAPSULATED_SIZE, XNONCE_SIZE};

/// Seals the ephemeral key in place. On entry `buf[..24]` holds the wrap
/// nonce and `buf[24..56]` the plaintext ephemeral key; on return the key
/// region holds ciphertext and `buf[56..]` the tag. The plaintext key is
/// gone from the buffer once this returns.
pub(crate) fn encapsulate(user_key: &[u8; KEY_SIZE], buf: &mut [u8; ENCAPSULATED_SIZE]) {
    let cipher = XChaCha20Poly1305::new(user_key.into());
    let (nonce, rest) = buf.split_at_mut(XNONCE_SIZE);
    let (body, tag_slot) = rest.split_at_mut(KEY_SIZE);
    let tag = cipher
        .encrypt_in_place_detached(XNonce::from_slice(nonce), &[], body)
        .expect("sealing a fixed-size key block cannot fail");
    tag_slot.copy_from_slice(&tag);
}

/// Recovers the ephemeral key into `out`. Fails with [`CaskError::AuthFailed`]
/// when the user key is wrong or the blob was tampered with.
pub(crate) fn decapsulate(
    user_key: &[u8; KEY_SIZE],
    encapsulated: &[u8; ENCAPSULATED_SIZE],
    out: &mut [u8; KEY_SIZE],
) -> CaskResult<()> {
    let cipher = XChaCha20Poly1305::new(user_key.into());
    let (nonce, rest) = encapsulated.split_at(XNONCE_SIZE);
    let (body, tag) = rest.split_at(KEY_SIZE);
    out.copy_from_slice(body);
    cipher
        .decrypt_in_place_detached(XNonce::from_slice(nonce), &[], out, Tag::from_slice(tag))
        .map_err(|_| CaskError::AuthFailed)?;
    Ok(())
}
