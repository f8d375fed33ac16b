//! XChaCha20-Poly1305 with empty associated data.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::CoreError;
use crate::kdf::KEY_LEN;

/// XChaCha20 nonce length (192 bits)
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag length
pub const TAG_LEN: usize = 16;

/// A fresh random nonce. Never derive or reuse one.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt, returning `ciphertext ‖ tag`.
pub fn seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, CoreError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(XNonce::from_slice(nonce), plaintext)
        .map_err(|_| CoreError::Encryption)
}

/// Decrypt `ciphertext ‖ tag`. Any mismatch is the one generic
/// [`CoreError::Authentication`].
pub fn open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    sealed: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CoreError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map(Zeroizing::new)
        .map_err(|_| CoreError::Authentication)
}
