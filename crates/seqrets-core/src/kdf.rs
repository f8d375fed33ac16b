//! Password + keyfile key derivation (Argon2id).
//!
//! The KDF input is `password ‖ keyfile`. The keyfile is appended, not
//! derived separately, so leaving it out yields an unrelated key rather than
//! a partially matching one.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::CoreError;

/// Argon2id parameters. Fixed: every build must derive the same key.
/// - m_cost: 64 MiB memory
/// - t_cost: 3 iterations
/// - p_cost: 1 lane
const ARGON2_M_COST: u32 = 65536;
const ARGON2_T_COST: u32 = 3;
const ARGON2_P_COST: u32 = 1;

/// Derived key length (XChaCha20-Poly1305 key)
pub const KEY_LEN: usize = 32;

/// Salt length for Argon2id
pub const SALT_LEN: usize = 16;

/// Length of generated keyfiles
pub const KEYFILE_LEN: usize = 32;

/// Derive a 32-byte key from `password ‖ keyfile` and `salt`.
///
/// The returned key zeroizes itself on drop, as does the concatenated input.
pub fn derive_key(
    password: &[u8],
    keyfile: Option<&[u8]>,
    salt: &[u8; SALT_LEN],
) -> Result<Zeroizing<[u8; KEY_LEN]>, CoreError> {
    let keyfile = keyfile.unwrap_or_default();
    let mut input = Zeroizing::new(Vec::with_capacity(password.len() + keyfile.len()));
    input.extend_from_slice(password);
    input.extend_from_slice(keyfile);

    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(KEY_LEN))
        .map_err(|e| CoreError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(&input, salt, key.as_mut_slice())
        .map_err(|e| CoreError::KeyDerivation(e.to_string()))?;

    Ok(key)
}

/// 16 fresh bytes from the OS CSPRNG.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Generate a random keyfile.
pub fn generate_keyfile() -> Zeroizing<Vec<u8>> {
    let mut keyfile = Zeroizing::new(vec![0u8; KEYFILE_LEN]);
    OsRng.fill_bytes(&mut keyfile);
    keyfile
}
