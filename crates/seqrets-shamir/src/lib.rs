//! seQRets Shamir Module
//!
//! Byte-wise Shamir's Secret Sharing over GF(256) plus the Qard string
//! format that carries each share alongside its salt and threshold.
//!
//! # Example
//!
//! ```
//! use seqrets_shamir::{reconstruct_secret, split_secret, ShamirConfig};
//!
//! let ciphertext = b"nonce-ciphertext-tag".to_vec();
//! let config = ShamirConfig::two_of_three();
//! let shares = split_secret(&ciphertext, config.threshold, config.total_shares).unwrap();
//!
//! let recovered = reconstruct_secret(&shares[1..3]).unwrap();
//! assert_eq!(recovered, ciphertext);
//! ```

pub mod gf256;
pub mod qard;
pub mod shamir;

// Re-exports
pub use qard::{combine_qards, split_to_qards, Qard, QARD_MAGIC};
pub use shamir::{reconstruct_secret, split_secret, Share};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShamirError {
    /// Bad (threshold, total) or an empty secret
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    /// Shares that cannot be interpolated together
    #[error("Cannot combine shares: {0}")]
    Combine(String),
    #[error("Invalid share format: {0}")]
    Format(String),
    /// Salts differ across a batch
    #[error("Shares come from different secrets")]
    MixedSets,
    #[error("Not enough shares: have {have}, need {need}")]
    InsufficientShares { have: usize, need: usize },
}

/// Configuration for a split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShamirConfig {
    /// Minimum shares needed to reconstruct (T)
    pub threshold: u8,
    /// Total shares to generate (N)
    pub total_shares: u8,
}

impl ShamirConfig {
    pub fn new(threshold: u8, total_shares: u8) -> Self {
        Self {
            threshold,
            total_shares,
        }
    }

    /// Common 2-of-3 setup
    pub fn two_of_three() -> Self {
        Self::new(2, 3)
    }

    /// Common 3-of-5 setup
    pub fn three_of_five() -> Self {
        Self::new(3, 5)
    }

    /// `1 <= threshold <= total_shares`. The u8 bound caps N at 255.
    pub fn validate(&self) -> Result<(), ShamirError> {
        if self.total_shares == 0 {
            return Err(ShamirError::Configuration(
                "total shares must be at least 1".into(),
            ));
        }
        if self.threshold == 0 {
            return Err(ShamirError::Configuration(
                "threshold must be at least 1".into(),
            ));
        }
        if self.threshold > self.total_shares {
            return Err(ShamirError::Configuration(format!(
                "threshold {} exceeds share count {}",
                self.threshold, self.total_shares
            )));
        }
        Ok(())
    }
}
