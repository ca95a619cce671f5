//! cask-core: shared foundation for the CaskFile workspace.
//!
//! Holds the typed error surface and the user key material that both sides
//! of the sealing pipeline depend on. The codec itself lives in `cask-seal`.

pub mod error;
pub mod key;

pub use error::{CaskError, CaskResult};
pub use key::{Key, KeyId, ID_SIZE, KEY_SIZE};
