//! Password-based encryption of payloads
//!
//! compress ─▶ Argon2id(password ‖ keyfile, salt) ─▶ XChaCha20-Poly1305
//!
//! # Security Notes
//!
//! - Salt (16 bytes) and nonce (24 bytes) are fresh OS randomness per call
//! - The derived key lives only inside one call and is zeroized on every exit path
//! - Decryption failures of any kind surface as [`CoreError::Authentication`]

use base64::{engine::general_purpose::STANDARD, Engine as _};
use zeroize::Zeroizing;

use crate::cipher::{self, NONCE_LEN, TAG_LEN};
use crate::codec;
use crate::error::CoreError;
use crate::kdf::{self, SALT_LEN};

/// Output of one encryption: `{salt, nonce ‖ ciphertext ‖ tag}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    /// Salt used for Argon2id key derivation
    pub salt: [u8; SALT_LEN],
    /// `nonce(24) ‖ ciphertext ‖ tag(16)`
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    pub fn salt_base64(&self) -> String {
        STANDARD.encode(self.salt)
    }

    pub fn data_base64(&self) -> String {
        STANDARD.encode(&self.ciphertext)
    }

    /// Rebuild a blob from its base64 wire fields.
    pub fn from_base64(salt_b64: &str, data_b64: &str) -> Result<Self, CoreError> {
        Ok(Self {
            salt: decode_salt(salt_b64)?,
            ciphertext: STANDARD
                .decode(data_b64)
                .map_err(|e| CoreError::Format(format!("data base64: {}", e)))?,
        })
    }
}

/// Decode and length-check a base64 salt.
pub fn decode_salt(salt_b64: &str) -> Result<[u8; SALT_LEN], CoreError> {
    let bytes = STANDARD
        .decode(salt_b64)
        .map_err(|e| CoreError::Format(format!("salt base64: {}", e)))?;
    bytes.as_slice().try_into().map_err(|_| {
        CoreError::Format(format!(
            "salt must be {} bytes, got {}",
            SALT_LEN,
            bytes.len()
        ))
    })
}

/// Compress and encrypt `plaintext` under `password ‖ keyfile`.
pub fn encrypt_bytes(
    plaintext: &[u8],
    password: &[u8],
    keyfile: Option<&[u8]>,
) -> Result<EncryptedBlob, CoreError> {
    let compressed = codec::compress(plaintext)?;
    let salt = kdf::generate_salt();
    let nonce = cipher::generate_nonce();

    let sealed = {
        let key = kdf::derive_key(password, keyfile, &salt)?;
        cipher::seal(&key, &nonce, &compressed)?
    };

    let mut ciphertext = Vec::with_capacity(NONCE_LEN + sealed.len());
    ciphertext.extend_from_slice(&nonce);
    ciphertext.extend_from_slice(&sealed);

    log::debug!(
        "encrypted {} bytes ({} compressed) into {} byte blob",
        plaintext.len(),
        compressed.len(),
        ciphertext.len()
    );

    Ok(EncryptedBlob { salt, ciphertext })
}

/// Decrypt and decompress a blob.
pub fn decrypt_bytes(
    blob: &EncryptedBlob,
    password: &[u8],
    keyfile: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>, CoreError> {
    decrypt_parts(&blob.salt, &blob.ciphertext, password, keyfile)
}

/// Decrypt `nonce ‖ ciphertext ‖ tag` with the given salt.
///
/// Used directly after share reconstruction, where the ciphertext comes
/// out of interpolation and the salt out of the Qard strings.
pub fn decrypt_parts(
    salt: &[u8; SALT_LEN],
    data: &[u8],
    password: &[u8],
    keyfile: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>, CoreError> {
    if data.len() < NONCE_LEN + TAG_LEN {
        return Err(CoreError::Authentication);
    }
    let (nonce, sealed) = data.split_at(NONCE_LEN);
    let nonce: &[u8; NONCE_LEN] = nonce.try_into().map_err(|_| CoreError::Authentication)?;

    let compressed = {
        let key = kdf::derive_key(password, keyfile, salt)?;
        cipher::open(&key, nonce, sealed)?
    };

    codec::decompress(&compressed).map_err(CoreError::into_auth_category)
}
