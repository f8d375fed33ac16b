//! Secret payloads: compacted text or a file record.
//!
//! Decoding tries the shapes in a fixed order. A buffer starting with `{`
//! can only be a file record, since `{` is never a segment tag; anything
//! else is the segment framing of [`Payload`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::compact::{self, Payload};
use crate::error::CoreError;

/// A file (or an instruction document) carried as the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub file_name: String,
    /// Base64 of the raw file bytes
    pub file_content: String,
    /// MIME type as reported by the caller
    pub file_type: String,
}

impl FileRecord {
    pub fn new(file_name: impl Into<String>, content: &[u8], file_type: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            file_content: STANDARD.encode(content),
            file_type: file_type.into(),
        }
    }

    /// Decoded file bytes.
    pub fn content(&self) -> Result<Zeroizing<Vec<u8>>, CoreError> {
        STANDARD
            .decode(&self.file_content)
            .map(Zeroizing::new)
            .map_err(|e| CoreError::Format(format!("fileContent base64: {}", e)))
    }

    pub fn to_json(&self) -> Result<Zeroizing<String>, CoreError> {
        serde_json::to_string(self)
            .map(Zeroizing::new)
            .map_err(|e| CoreError::Format(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        serde_json::from_str(json).map_err(|e| CoreError::Format(format!("file record: {}", e)))
    }
}

/// The canonical plaintext of one secure operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretPayload {
    /// Text secret, compacted
    Text(Payload),
    /// Generic file content
    File(FileRecord),
}

impl SecretPayload {
    /// Compact a text secret.
    pub fn text(secret: &str) -> Self {
        SecretPayload::Text(compact::compact(secret))
    }

    pub fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>, CoreError> {
        match self {
            SecretPayload::Text(payload) => Ok(payload.to_bytes()),
            SecretPayload::File(record) => {
                let json = record.to_json()?;
                Ok(Zeroizing::new(json.as_bytes().to_vec()))
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.first() == Some(&b'{') {
            let json = std::str::from_utf8(bytes)
                .map_err(|e| CoreError::Format(format!("file record utf-8: {}", e)))?;
            return FileRecord::from_json(json).map(SecretPayload::File);
        }
        Payload::from_bytes(bytes).map(SecretPayload::Text)
    }
}
