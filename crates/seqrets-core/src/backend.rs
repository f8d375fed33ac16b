//! Request/response facade over the encryption pipeline.
//!
//! This is the narrow boundary callers outside the crypto domain talk to:
//! base64 salts and ciphertexts in, plaintext or an opaque failure out.
//! No key bytes ever cross it.
//!
//! | Call           | Input                                 | Output        |
//! |----------------|---------------------------------------|---------------|
//! | `create`       | payload, password, keyfile?           | `{salt, data}`|
//! | `restore`      | salt, data, password, keyfile?        | payload       |
//! | `encrypt_blob` | json, password, keyfile?              | `{salt, data}`|
//! | `decrypt_blob` | salt, data, password, keyfile?        | json          |
//!
//! Keyfiles are passed base64-encoded.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{self, EncryptedBlob};
use crate::error::CoreError;

/// Salt and ciphertext, both base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobResult {
    /// base64 of the 16-byte salt
    pub salt: String,
    /// base64 of `nonce ‖ ciphertext ‖ tag`
    pub data: String,
}

impl From<&EncryptedBlob> for BlobResult {
    fn from(blob: &EncryptedBlob) -> Self {
        Self {
            salt: blob.salt_base64(),
            data: blob.data_base64(),
        }
    }
}

fn decode_keyfile(keyfile_b64: Option<&str>) -> Result<Option<Zeroizing<Vec<u8>>>, CoreError> {
    keyfile_b64
        .map(|kf| {
            STANDARD
                .decode(kf)
                .map(Zeroizing::new)
                .map_err(|e| CoreError::Format(format!("keyfile base64: {}", e)))
        })
        .transpose()
}

/// Compress and encrypt a secret payload. The caller splits `data`.
pub fn create(
    payload: &[u8],
    password: &str,
    keyfile_b64: Option<&str>,
) -> Result<BlobResult, CoreError> {
    let keyfile = decode_keyfile(keyfile_b64)?;
    let keyfile = keyfile.as_deref().map(Vec::as_slice);
    let blob = crypto::encrypt_bytes(payload, password.as_bytes(), keyfile)?;
    Ok(BlobResult::from(&blob))
}

/// Decrypt a (recombined) payload.
pub fn restore(
    salt_b64: &str,
    data_b64: &str,
    password: &str,
    keyfile_b64: Option<&str>,
) -> Result<Zeroizing<Vec<u8>>, CoreError> {
    let keyfile = decode_keyfile(keyfile_b64)?;
    let blob = EncryptedBlob::from_base64(salt_b64, data_b64)?;
    crypto::decrypt_bytes(&blob, password.as_bytes(), keyfile.as_deref().map(Vec::as_slice))
}

/// Encrypt a JSON document (vault or instructions).
pub fn encrypt_blob(
    json: &str,
    password: &str,
    keyfile_b64: Option<&str>,
) -> Result<BlobResult, CoreError> {
    create(json.as_bytes(), password, keyfile_b64)
}

/// Decrypt a JSON document produced by [`encrypt_blob`].
pub fn decrypt_blob(
    salt_b64: &str,
    data_b64: &str,
    password: &str,
    keyfile_b64: Option<&str>,
) -> Result<Zeroizing<String>, CoreError> {
    let plaintext = restore(salt_b64, data_b64, password, keyfile_b64)?;
    let json = std::str::from_utf8(&plaintext).map_err(|_| CoreError::Authentication)?;
    Ok(Zeroizing::new(json.to_owned()))
}
