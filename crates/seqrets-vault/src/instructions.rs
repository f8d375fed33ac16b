//! Encrypted instructions
//!
//! A written inheritance plan or an arbitrary document, encrypted with the
//! same password and keyfile as the shares and carried next to them in an
//! [`ExportedVault`](crate::ExportedVault) or on a card.
//!
//! The plaintext is always a [`FileRecord`]. Records whose `fileType` is
//! [`PLAN_FILE_TYPE`] and whose content parses as a JSON object are
//! in-app plans; anything else is an opaque file.

use serde::{Deserialize, Serialize};
use seqrets_core::{crypto, EncryptedBlob, FileRecord};

use crate::VaultError;

/// MIME type marking a record as an in-app inheritance plan
pub const PLAN_FILE_TYPE: &str = "application/vnd.seqrets.plan+json";

/// `{salt, data}`, both base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedInstruction {
    pub salt: String,
    pub data: String,
}

/// What a decrypted instruction turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionContent {
    /// Structured plan built in the app
    Plan(serde_json::Value),
    /// Any other uploaded document
    File(FileRecord),
}

impl InstructionContent {
    /// Decide between plan and file. Never fails: anything that is not a
    /// well-formed plan is kept as a file.
    pub fn classify(record: FileRecord) -> Self {
        if record.file_type == PLAN_FILE_TYPE {
            let plan = record
                .content()
                .ok()
                .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok())
                .filter(serde_json::Value::is_object);
            if let Some(plan) = plan {
                return InstructionContent::Plan(plan);
            }
            log::debug!("plan-typed instruction is not a JSON object, treating as file");
        }
        InstructionContent::File(record)
    }

    /// Wrap a plan object as a record ready for encryption.
    pub fn plan_record(plan: &serde_json::Value) -> Result<FileRecord, VaultError> {
        if !plan.is_object() {
            return Err(VaultError::Format("plan must be a JSON object".into()));
        }
        let json = serde_json::to_vec(plan)?;
        Ok(FileRecord::new("inheritance-plan.json", &json, PLAN_FILE_TYPE))
    }
}

impl EncryptedInstruction {
    /// Encrypt a record under `password ‖ keyfile`.
    pub fn encrypt(
        record: &FileRecord,
        password: &str,
        keyfile: Option<&[u8]>,
    ) -> Result<Self, VaultError> {
        let json = record.to_json()?;
        let blob = crypto::encrypt_bytes(json.as_bytes(), password.as_bytes(), keyfile)?;
        Ok(Self {
            salt: blob.salt_base64(),
            data: blob.data_base64(),
        })
    }

    /// Decrypt back to the record.
    pub fn decrypt(&self, password: &str, keyfile: Option<&[u8]>) -> Result<FileRecord, VaultError> {
        let blob = EncryptedBlob::from_base64(&self.salt, &self.data)?;
        let plaintext = crypto::decrypt_bytes(&blob, password.as_bytes(), keyfile)?;
        let json = std::str::from_utf8(&plaintext)
            .map_err(|e| VaultError::Format(format!("instruction utf-8: {}", e)))?;
        Ok(FileRecord::from_json(json)?)
    }

    /// Decrypt and classify.
    pub fn open(
        &self,
        password: &str,
        keyfile: Option<&[u8]>,
    ) -> Result<InstructionContent, VaultError> {
        self.decrypt(password, keyfile).map(InstructionContent::classify)
    }

    pub fn to_json(&self) -> Result<String, VaultError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, VaultError> {
        Ok(serde_json::from_str(json)?)
    }
}
