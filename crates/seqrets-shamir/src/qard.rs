//! Qard share strings
//!
//! One share of an encrypted blob, in the text form that gets printed as a
//! QR code or written to a card:
//!
//! ```text
//! seQRets|<base64 salt>|<base64 (index ‖ threshold ‖ y-bytes)>
//! ```
//!
//! The salt is repeated unsplit in every Qard. The threshold rides along in
//! the fragment so a batch with too few shares is caught before any key
//! derivation happens.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use seqrets_core::{crypto::decode_salt, SALT_LEN};

use crate::shamir::{reconstruct_secret, split_secret, Share};
use crate::{ShamirConfig, ShamirError};

/// Leading field of every Qard string
pub const QARD_MAGIC: &str = "seQRets";

const SEPARATOR: char = '|';

/// index + threshold
const FRAGMENT_HEADER_LEN: usize = 2;

/// A share together with its salt and threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Qard {
    pub salt: [u8; SALT_LEN],
    pub threshold: u8,
    pub share: Share,
}

impl Qard {
    pub fn index(&self) -> u8 {
        self.share.index
    }

    pub fn salt_base64(&self) -> String {
        STANDARD.encode(self.salt)
    }

    /// `seQRets|salt|fragment`
    pub fn encode(&self) -> String {
        let mut fragment = Vec::with_capacity(FRAGMENT_HEADER_LEN + self.share.data.len());
        fragment.push(self.share.index);
        fragment.push(self.threshold);
        fragment.extend_from_slice(&self.share.data);

        format!(
            "{}{sep}{}{sep}{}",
            QARD_MAGIC,
            self.salt_base64(),
            STANDARD.encode(fragment),
            sep = SEPARATOR
        )
    }

    /// Parse a Qard string. Surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Result<Self, ShamirError> {
        let fields: Vec<&str> = s.trim().split(SEPARATOR).collect();
        let [magic, salt_b64, fragment_b64] = fields.as_slice() else {
            return Err(ShamirError::Format(format!(
                "expected 3 fields, got {}",
                fields.len()
            )));
        };

        if *magic != QARD_MAGIC {
            return Err(ShamirError::Format("not a seQRets share".into()));
        }

        let salt = decode_salt(salt_b64).map_err(|e| ShamirError::Format(e.to_string()))?;

        let fragment = STANDARD
            .decode(fragment_b64)
            .map_err(|e| ShamirError::Format(format!("share base64: {}", e)))?;
        if fragment.len() <= FRAGMENT_HEADER_LEN {
            return Err(ShamirError::Format("share fragment too short".into()));
        }

        let index = fragment[0];
        let threshold = fragment[1];
        if index == 0 {
            return Err(ShamirError::Format("share index 0 is invalid".into()));
        }
        if threshold == 0 {
            return Err(ShamirError::Format("threshold 0 is invalid".into()));
        }

        Ok(Self {
            salt,
            threshold,
            share: Share {
                index,
                data: fragment[FRAGMENT_HEADER_LEN..].to_vec(),
            },
        })
    }
}

impl fmt::Display for Qard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Qard {
    type Err = ShamirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Qard::parse(s)
    }
}

/// Split `ciphertext` into Qards that all carry `salt`.
pub fn split_to_qards(
    salt: &[u8; SALT_LEN],
    ciphertext: &[u8],
    config: ShamirConfig,
) -> Result<Vec<Qard>, ShamirError> {
    let shares = split_secret(ciphertext, config.threshold, config.total_shares)?;
    Ok(shares
        .into_iter()
        .map(|share| Qard {
            salt: *salt,
            threshold: config.threshold,
            share,
        })
        .collect())
}

/// Check a batch of Qards and interpolate the ciphertext.
///
/// Checks run in a fixed order: same salt, same threshold, enough shares,
/// then the structural checks of [`reconstruct_secret`].
pub fn combine_qards(qards: &[Qard]) -> Result<([u8; SALT_LEN], Vec<u8>), ShamirError> {
    let first = qards
        .first()
        .ok_or(ShamirError::InsufficientShares { have: 0, need: 1 })?;

    if qards.iter().any(|q| q.salt != first.salt) {
        return Err(ShamirError::MixedSets);
    }
    if qards.iter().any(|q| q.threshold != first.threshold) {
        return Err(ShamirError::Format("shares disagree on threshold".into()));
    }

    let need = first.threshold as usize;
    if qards.len() < need {
        return Err(ShamirError::InsufficientShares {
            have: qards.len(),
            need,
        });
    }

    let shares: Vec<Share> = qards.iter().map(|q| q.share.clone()).collect();
    let ciphertext = reconstruct_secret(&shares)?;
    log::debug!(
        "combined {} shares (threshold {}) into {} bytes",
        qards.len(),
        need,
        ciphertext.len()
    );
    Ok((first.salt, ciphertext))
}
