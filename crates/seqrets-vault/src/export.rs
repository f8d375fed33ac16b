//! Vault files
//!
//! An [`ExportedVault`] bundles a whole share set for local backup. It can be
//! written as is (`version: 1`) or wrapped once more under a separate vault
//! password as an [`EncryptedVaultFile`] (`version: 2, encrypted: true`).
//! [`VaultFile::parse`] tells the two apart.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use seqrets_core::{crypto, EncryptedBlob};
use zeroize::Zeroizing;

use crate::instructions::EncryptedInstruction;
use crate::pipeline::ShareSet;
use crate::VaultError;

/// `ExportedVault.version`
pub const EXPORT_VERSION: u32 = 1;

/// `EncryptedVaultFile.version`
pub const ENCRYPTED_VAULT_VERSION: u32 = 2;

/// Serialized share set plus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedVault {
    pub version: u32,
    pub label: String,
    /// First 8 characters of the salt's base64, for display only
    pub set_id: String,
    /// Qard strings
    pub shares: Vec<String>,
    pub required_shares: u8,
    pub total_shares: u8,
    /// ISO-8601 creation timestamp
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_instructions: Option<EncryptedInstruction>,
    pub keyfile_used: bool,
}

impl ExportedVault {
    /// Snapshot a share set, stamped with the current time.
    pub fn from_share_set(
        set: &ShareSet,
        label: impl Into<String>,
        keyfile_used: bool,
        encrypted_instructions: Option<EncryptedInstruction>,
    ) -> Self {
        Self {
            version: EXPORT_VERSION,
            label: label.into(),
            set_id: set.set_id(),
            shares: set.to_strings(),
            required_shares: set.threshold(),
            total_shares: set.total(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            encrypted_instructions,
            keyfile_used,
        }
    }

    /// Rebuild the share set; every Qard is checked against the metadata.
    pub fn share_set(&self) -> Result<ShareSet, VaultError> {
        let set = ShareSet::from_strings(&self.shares, self.total_shares, self.required_shares)?;
        if set.set_id() != self.set_id {
            log::warn!(
                "vault setId {:?} does not match its shares ({:?})",
                self.set_id,
                set.set_id()
            );
        }
        Ok(set)
    }

    pub fn to_json(&self) -> Result<String, VaultError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, VaultError> {
        let vault: Self = serde_json::from_str(json)?;
        vault.check_version()?;
        Ok(vault)
    }

    fn check_version(&self) -> Result<(), VaultError> {
        if self.version != EXPORT_VERSION {
            return Err(VaultError::UnsupportedVersion {
                kind: "vault",
                version: self.version,
            });
        }
        Ok(())
    }

    /// Serialize and wrap under a vault password.
    pub fn encrypt(&self, vault_password: &str) -> Result<EncryptedVaultFile, VaultError> {
        EncryptedVaultFile::seal(&self.to_json()?, vault_password)
    }
}

/// An [`ExportedVault`]'s JSON encrypted under a vault password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedVaultFile {
    pub version: u32,
    pub encrypted: bool,
    pub salt: String,
    pub data: String,
}

impl EncryptedVaultFile {
    /// Encrypt vault JSON. No keyfile: the vault password alone protects the file.
    pub fn seal(vault_json: &str, vault_password: &str) -> Result<Self, VaultError> {
        let blob = crypto::encrypt_bytes(vault_json.as_bytes(), vault_password.as_bytes(), None)?;
        log::debug!("sealed {} byte vault file", vault_json.len());
        Ok(Self {
            version: ENCRYPTED_VAULT_VERSION,
            encrypted: true,
            salt: blob.salt_base64(),
            data: blob.data_base64(),
        })
    }

    /// Decrypt to the exact JSON that was sealed.
    pub fn open_json(&self, vault_password: &str) -> Result<Zeroizing<String>, VaultError> {
        self.check_header()?;
        let blob = EncryptedBlob::from_base64(&self.salt, &self.data)?;
        let plaintext = crypto::decrypt_bytes(&blob, vault_password.as_bytes(), None)?;
        let json = std::str::from_utf8(&plaintext)
            .map_err(|e| VaultError::Format(format!("vault utf-8: {}", e)))?;
        Ok(Zeroizing::new(json.to_owned()))
    }

    /// Decrypt and parse the inner vault.
    pub fn open(&self, vault_password: &str) -> Result<ExportedVault, VaultError> {
        let json = self.open_json(vault_password)?;
        ExportedVault::from_json(&json)
    }

    fn check_header(&self) -> Result<(), VaultError> {
        if !self.encrypted {
            return Err(VaultError::Format("vault file is not marked encrypted".into()));
        }
        if self.version != ENCRYPTED_VAULT_VERSION {
            return Err(VaultError::UnsupportedVersion {
                kind: "encrypted vault",
                version: self.version,
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, VaultError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, VaultError> {
        let file: Self = serde_json::from_str(json)?;
        file.check_header()?;
        Ok(file)
    }
}

/// A vault file read from disk, either form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultFile {
    Plain(ExportedVault),
    Encrypted(EncryptedVaultFile),
}

impl VaultFile {
    /// Dispatch on `"encrypted": true`.
    pub fn parse(json: &str) -> Result<Self, VaultError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(VaultError::Format("vault file must be a JSON object".into()));
        }

        if value.get("encrypted").and_then(serde_json::Value::as_bool) == Some(true) {
            let file: EncryptedVaultFile = serde_json::from_value(value)?;
            file.check_header()?;
            Ok(VaultFile::Encrypted(file))
        } else {
            let vault: ExportedVault = serde_json::from_value(value)?;
            vault.check_version()?;
            Ok(VaultFile::Plain(vault))
        }
    }

    /// The plain vault, decrypting first when needed.
    pub fn into_vault(self, vault_password: Option<&str>) -> Result<ExportedVault, VaultError> {
        match self {
            VaultFile::Plain(vault) => Ok(vault),
            VaultFile::Encrypted(file) => {
                let password = vault_password.ok_or_else(|| {
                    VaultError::Format("vault file is encrypted; a vault password is required".into())
                })?;
                file.open(password)
            }
        }
    }
}
