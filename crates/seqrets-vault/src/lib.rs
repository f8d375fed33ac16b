//! seQRets Vault
//!
//! The secure path end to end, and the file formats built on it:
//!
//! - [`pipeline`]: secret ⇄ [`ShareSet`] of Qard strings
//! - [`export`]: [`ExportedVault`] JSON, [`EncryptedVaultFile`] and [`VaultFile`] dispatch
//! - [`instructions`]: [`EncryptedInstruction`] blobs and their plan/file classification

pub mod export;
pub mod instructions;
pub mod pipeline;

pub use export::{EncryptedVaultFile, ExportedVault, VaultFile};
pub use instructions::{EncryptedInstruction, InstructionContent, PLAN_FILE_TYPE};
pub use pipeline::{
    create_share_set, restore_payload, restore_text, split_text, ShareSet,
};

use seqrets_core::CoreError;
use seqrets_shamir::ShamirError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Shamir(#[from] ShamirError),
    #[error("Invalid vault data: {0}")]
    Format(String),
    #[error("Unsupported {kind} version {version}")]
    UnsupportedVersion { kind: &'static str, version: u32 },
}

impl VaultError {
    /// True for the single opaque decrypt failure.
    pub fn is_authentication(&self) -> bool {
        matches!(self, VaultError::Core(CoreError::Authentication))
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Format(e.to_string())
    }
}
