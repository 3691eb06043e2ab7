//! Authenticated encryption of file bodies.
//!
//! One primitive: XSalsa20-Poly1305 (NaCl secretbox). The wire format is
//! `nonce(24) || ciphertext`; the nonce prefix is mandatory so files remain
//! portable across implementations.

use std::path::Path;

use crypto_secretbox::aead::Aead;
use crypto_secretbox::{KeyInit, Nonce, XSalsa20Poly1305};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::secret::SymmetricKey;

/// Length of the nonce prefix in bytes.
pub const NONCE_LEN: usize = 24;
/// Poly1305 authentication tag length.
pub const TAG_LEN: usize = 16;

/// Seal `plaintext` under `key` with a freshly drawn random nonce.
pub fn seal(key: &SymmetricKey, plaintext: &[u8]) -> Vec<u8> {
    let cipher = XSalsa20Poly1305::new_from_slice(key.expose()).expect("key length is fixed");
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ct = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .expect("secretbox accepts any message length");
    let mut out = Vec::with_capacity(NONCE_LEN + ct.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ct);
    out
}

/// Open `nonce(24) || ct` read from `origin`. Authentication failure is
/// fatal and reports the offending path.
pub fn open(key: &SymmetricKey, sealed: &[u8], origin: &Path) -> Result<Zeroizing<Vec<u8>>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(Error::InvalidFileType {
            path: origin.to_path_buf(),
            expected: "a sealed file (nonce || ciphertext)",
        });
    }
    let (nonce, ct) = sealed.split_at(NONCE_LEN);
    let cipher = XSalsa20Poly1305::new_from_slice(key.expose()).expect("key length is fixed");
    let pt = cipher
        .decrypt(Nonce::from_slice(nonce), ct)
        .map_err(|_| Error::FileDecryptFailed(origin.to_path_buf()))?;
    Ok(Zeroizing::new(pt))
}
