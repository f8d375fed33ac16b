//! Secure create / restore
//!
//! ```text
//! create:  SecretPayload ─▶ encrypt_bytes ─▶ split_to_qards ─▶ ShareSet
//! restore: Qard strings ─▶ combine_qards ─▶ decrypt_parts ─▶ SecretPayload
//! ```
//!
//! Share configuration is validated before the key derivation runs, and
//! batch problems (mixed salts, too few shares) are reported before it too.

use seqrets_core::{crypto, expand, SecretPayload, SALT_LEN};
use seqrets_shamir::{combine_qards, split_to_qards, Qard, ShamirConfig, ShamirError};
use zeroize::Zeroizing;

use crate::VaultError;

/// Length of the human-facing set fingerprint
pub const SET_ID_LEN: usize = 8;

/// The N Qards produced by one encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareSet {
    shares: Vec<Qard>,
    total: u8,
    threshold: u8,
}

impl ShareSet {
    /// Build a set from parsed Qards, checking that they belong together.
    ///
    /// `shares` may be a subset of the N produced; every Qard must carry the
    /// same salt and `threshold`, and indices must lie in `1..=total`.
    pub fn new(shares: Vec<Qard>, total: u8, threshold: u8) -> Result<Self, VaultError> {
        ShamirConfig::new(threshold, total).validate()?;
        let first = shares
            .first()
            .ok_or_else(|| VaultError::Format("share set is empty".into()))?;

        if shares.iter().any(|q| q.salt != first.salt) {
            return Err(ShamirError::MixedSets.into());
        }
        if let Some(q) = shares.iter().find(|q| q.threshold != threshold) {
            return Err(VaultError::Format(format!(
                "share {} has threshold {}, expected {}",
                q.index(),
                q.threshold,
                threshold
            )));
        }
        if let Some(q) = shares.iter().find(|q| q.index() > total) {
            return Err(VaultError::Format(format!(
                "share index {} exceeds total {}",
                q.index(),
                total
            )));
        }

        Ok(Self {
            shares,
            total,
            threshold,
        })
    }

    /// Parse Qard strings into a set.
    pub fn from_strings<S: AsRef<str>>(
        strings: &[S],
        total: u8,
        threshold: u8,
    ) -> Result<Self, VaultError> {
        let shares = strings
            .iter()
            .map(|s| Qard::parse(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(shares, total, threshold)
    }

    pub fn shares(&self) -> &[Qard] {
        &self.shares
    }

    pub fn total(&self) -> u8 {
        self.total
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// The salt shared by every Qard in the set.
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        // `new` rejects empty sets
        &self.shares[0].salt
    }

    /// Short fingerprint for labelling: the first 8 characters of the salt's base64.
    pub fn set_id(&self) -> String {
        self.shares[0].salt_base64().chars().take(SET_ID_LEN).collect()
    }

    /// The Qard strings, in index order as produced.
    pub fn to_strings(&self) -> Vec<String> {
        self.shares.iter().map(Qard::encode).collect()
    }
}

/// Encrypt a payload and split it into a share set.
pub fn create_share_set(
    payload: &SecretPayload,
    password: &str,
    keyfile: Option<&[u8]>,
    config: ShamirConfig,
) -> Result<ShareSet, VaultError> {
    config.validate()?;

    let plaintext = payload.to_bytes()?;
    let blob = crypto::encrypt_bytes(&plaintext, password.as_bytes(), keyfile)?;
    let shares = split_to_qards(&blob.salt, &blob.ciphertext, config)?;

    log::info!(
        "created {}-of-{} share set ({} byte shares, keyfile: {})",
        config.threshold,
        config.total_shares,
        blob.ciphertext.len(),
        keyfile.is_some()
    );

    Ok(ShareSet {
        shares,
        total: config.total_shares,
        threshold: config.threshold,
    })
}

/// Compact a text secret (mnemonic-aware) and split it.
pub fn split_text(
    secret: &str,
    password: &str,
    keyfile: Option<&[u8]>,
    config: ShamirConfig,
) -> Result<ShareSet, VaultError> {
    create_share_set(&SecretPayload::text(secret), password, keyfile, config)
}

/// Recombine Qard strings and decrypt the payload.
///
/// Format and batch errors come back as such; everything after the
/// interpolation (wrong password, wrong or missing keyfile, a corrupted
/// share) is the one [`seqrets_core::CoreError::Authentication`].
pub fn restore_payload<S: AsRef<str>>(
    shares: &[S],
    password: &str,
    keyfile: Option<&[u8]>,
) -> Result<SecretPayload, VaultError> {
    let qards = shares
        .iter()
        .map(|s| Qard::parse(s.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    let (salt, ciphertext) = combine_qards(&qards)?;
    let plaintext = crypto::decrypt_parts(&salt, &ciphertext, password.as_bytes(), keyfile)?;

    log::info!("restored secret from {} shares", qards.len());
    Ok(SecretPayload::from_bytes(&plaintext)?)
}

/// Restore a text secret, expanding compacted mnemonics back into words.
pub fn restore_text<S: AsRef<str>>(
    shares: &[S],
    password: &str,
    keyfile: Option<&[u8]>,
) -> Result<Zeroizing<String>, VaultError> {
    match restore_payload(shares, password, keyfile)? {
        SecretPayload::Text(payload) => Ok(expand(&payload)?),
        SecretPayload::File(record) => Err(VaultError::Format(format!(
            "shares hold the file {:?}, not text",
            record.file_name
        ))),
    }
}
