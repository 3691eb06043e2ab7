use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Length of the project symmetric key in bytes.
pub const KEY_LEN: usize = 32;

/// The project symmetric key.
///
/// Exists only transiently in process memory; the backing buffer is zeroized
/// when the value is dropped, on every path.
pub struct SymmetricKey(Secret<[u8; KEY_LEN]>);

impl SymmetricKey {
    /// Draw a fresh 256-bit key from the OS RNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        let wrapped = SymmetricKey(Secret::new(key));
        key.zeroize();
        wrapped
    }

    /// Take ownership of unwrapped key bytes, zeroizing the source.
    pub fn from_bytes(bytes: &mut Vec<u8>) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            bytes.zeroize();
            return Err(Error::KeyDecryptFailed);
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(bytes);
        bytes.zeroize();
        let wrapped = SymmetricKey(Secret::new(key));
        key.zeroize();
        Ok(wrapped)
    }

    pub fn expose(&self) -> &[u8; KEY_LEN] {
        self.0.expose_secret()
    }

    /// Constant-time equality, for verifying that two wrappings unwrap to the
    /// same project key.
    pub fn ct_eq(&self, other: &SymmetricKey) -> bool {
        self.expose()[..].ct_eq(&other.expose()[..]).into()
    }
}
