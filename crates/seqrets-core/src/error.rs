use thiserror::Error;

/// Failures of the compaction and encryption pipeline.
///
/// `Authentication` deliberately carries no detail: a wrong password, a
/// missing keyfile, too few shares and tampered bytes all look the same.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid format: {0}")]
    Format(String),
    #[error("Decompression failed: {0}")]
    Decode(String),
    #[error("Compression failed: {0}")]
    Compression(String),
    #[error("Authentication failed: check password, keyfile, and shares")]
    Authentication,
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("Encryption failed")]
    Encryption,
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),
}

impl CoreError {
    /// Collapse decode failures into the authentication category.
    ///
    /// A payload that decrypted but will not decompress can only come from a
    /// wrong reconstruction, so callers see the same error as a bad tag.
    pub fn into_auth_category(self) -> Self {
        match self {
            CoreError::Decode(_) => CoreError::Authentication,
            other => other,
        }
    }
}
