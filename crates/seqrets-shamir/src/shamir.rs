//! Core Shamir's Secret Sharing implementation
//!
//! Split a secret into N shares where any T can reconstruct it. Each byte
//! gets its own random polynomial of degree T-1.

use crate::gf256::{gf_mul, lagrange_basis_at_zero, poly_eval};
use crate::{ShamirConfig, ShamirError};
use rand::RngCore;
use zeroize::Zeroizing;

use serde::{Deserialize, Serialize};

/// A single share of a secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    /// Share index (1..=N, never 0)
    pub index: u8,
    /// Share data (same length as original secret)
    pub data: Vec<u8>,
}

/// Split a secret into shares using Shamir's Secret Sharing
///
/// # Arguments
/// * `secret` - The secret bytes to split
/// * `threshold` - Minimum shares needed to reconstruct (T)
/// * `total` - Total shares to generate (N)
///
/// # Returns
/// Vector of N shares with indices 1..=N, any T of which reconstruct the secret
pub fn split_secret(secret: &[u8], threshold: u8, total: u8) -> Result<Vec<Share>, ShamirError> {
    ShamirConfig::new(threshold, total).validate()?;
    if secret.is_empty() {
        return Err(ShamirError::Configuration("secret is empty".into()));
    }

    let mut rng = rand::thread_rng();
    let mut shares: Vec<Share> = (1..=total)
        .map(|i| Share {
            index: i,
            data: Vec::with_capacity(secret.len()),
        })
        .collect();

    // p(x) = secret + c1*x + ... + c_{t-1}*x^{t-1}
    let mut coefficients = Zeroizing::new(vec![0u8; threshold as usize]);
    for &secret_byte in secret {
        coefficients[0] = secret_byte;
        rng.fill_bytes(&mut coefficients[1..]);

        for share in &mut shares {
            share.data.push(poly_eval(&coefficients, share.index));
        }
    }

    log::trace!(
        "split {} bytes into {} shares (threshold {})",
        secret.len(),
        total,
        threshold
    );
    Ok(shares)
}

/// Reconstruct a secret from shares
///
/// The caller is responsible for passing at least `threshold` shares; fewer
/// interpolate to an unrelated value. Zero indices, unequal lengths, and
/// duplicate indices are rejected.
pub fn reconstruct_secret(shares: &[Share]) -> Result<Vec<u8>, ShamirError> {
    let first = shares
        .first()
        .ok_or_else(|| ShamirError::Combine("no shares given".into()))?;

    if shares.iter().any(|s| s.index == 0) {
        return Err(ShamirError::Combine("share index 0 is invalid".into()));
    }

    // All shares must have the same length
    let secret_len = first.data.len();
    if shares.iter().any(|s| s.data.len() != secret_len) {
        return Err(ShamirError::Combine("shares have different lengths".into()));
    }

    // Check for duplicate indices
    let mut indices: Vec<u8> = shares.iter().map(|s| s.index).collect();
    indices.sort_unstable();
    indices.dedup();
    if indices.len() != shares.len() {
        return Err(ShamirError::Combine("duplicate share indices".into()));
    }

    // The basis only depends on the x coordinates, so compute it once
    let xs: Vec<u8> = shares.iter().map(|s| s.index).collect();
    let basis = lagrange_basis_at_zero(&xs);

    let secret = (0..secret_len)
        .map(|byte_idx| {
            shares
                .iter()
                .zip(&basis)
                .fold(0u8, |acc, (share, &l)| acc ^ gf_mul(share.data[byte_idx], l))
        })
        .collect();

    Ok(secret)
}
