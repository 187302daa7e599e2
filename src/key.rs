//! The 256-bit master key supplied by the caller.

use crate::error::CoreError;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A parsed 32-byte master key. Zeroized on drop; never `Debug`-printed
/// or logged anywhere in this crate.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    /// Parse a 64-character hex string into a master key.
    ///
    /// Rejects any input whose length is not exactly 64 or that contains
    /// non-hex characters, before any I/O on the caller's files happens.
    pub fn from_hex(hex_key: &str) -> Result<Self, CoreError> {
        if hex_key.len() != 64 {
            return Err(CoreError::InvalidKey(format!(
                "key must be exactly 64 hex characters, got {}",
                hex_key.len()
            )));
        }
        let bytes =
            hex::decode(hex_key).map_err(|e| CoreError::InvalidKey(format!("invalid hex: {e}")))?;
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(MasterKey(key))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}
