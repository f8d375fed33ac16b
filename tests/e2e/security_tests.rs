//! Security-specific tests for audit preparation.
//!
//! These tests verify:
//! 1. Every decrypt failure collapses into one opaque error
//! 2. Tampered shares, salts and vault files are rejected
//! 3. Too few shares never yield plaintext
//! 4. Malformed inputs don't panic

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{Rng, RngCore};
use seqrets_core::{backend, crypto::decrypt_parts, CoreError};
use seqrets_shamir::{reconstruct_secret, Qard, ShamirConfig, ShamirError, Share};
use seqrets_vault::{restore_text, split_text, ExportedVault, VaultError, VaultFile};

const PASSWORD: &str = "correct horse battery staple long";
const SECRET: &str = "legal winner thank year wave sausage worth useful legal winner thank yellow";

fn shares_2_of_3(keyfile: Option<&[u8]>) -> Vec<String> {
    split_text(SECRET, PASSWORD, keyfile, ShamirConfig::two_of_three())
        .unwrap()
        .to_strings()
}

// ============================================================================
// 1. One opaque authentication error
// ============================================================================

#[test]
fn test_authentication_message_is_fixed() {
    assert_eq!(
        CoreError::Authentication.to_string(),
        "Authentication failed: check password, keyfile, and shares"
    );

    let shares = shares_2_of_3(None);
    let err = restore_text(&shares[..2], "wrong password", None).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Authentication failed: check password, keyfile, and shares"
    );
}

#[test]
fn test_keyfile_mismatches_are_indistinguishable() {
    let keyfile = [0x5Au8; 32];
    let other = [0xA5u8; 32];
    let with_keyfile = shares_2_of_3(Some(keyfile.as_slice()));
    let without_keyfile = shares_2_of_3(None);

    // Missing keyfile
    let missing = restore_text(&with_keyfile[..2], PASSWORD, None).unwrap_err();
    // Wrong keyfile
    let wrong = restore_text(&with_keyfile[..2], PASSWORD, Some(other.as_slice())).unwrap_err();
    // Keyfile supplied where none was used
    let extra = restore_text(&without_keyfile[..2], PASSWORD, Some(keyfile.as_slice())).unwrap_err();
    // Wrong password with the right keyfile
    let password = restore_text(&with_keyfile[..2], "nope", Some(keyfile.as_slice())).unwrap_err();

    for err in [&missing, &wrong, &extra, &password] {
        assert_eq!(err, &VaultError::Core(CoreError::Authentication));
    }

    // Sanity: the right combination works
    let restored = restore_text(&with_keyfile[1..], PASSWORD, Some(keyfile.as_slice())).unwrap();
    assert_eq!(restored.as_str(), SECRET);
}

// ============================================================================
// 2. Tampering
// ============================================================================

#[test]
fn test_flipped_share_byte_fails_authentication() {
    let shares = shares_2_of_3(None);
    let mut qard = Qard::parse(&shares[0]).unwrap();

    // Positions in the nonce, the body and the tag
    let last = qard.share.data.len() - 1;
    for position in [0, 30, last] {
        let mut tampered = qard.clone();
        tampered.share.data[position] ^= 0x01;
        let err = restore_text(&[tampered.encode(), shares[1].clone()], PASSWORD, None)
            .unwrap_err();
        assert!(err.is_authentication(), "position {}: {:?}", position, err);
    }

    // Truncating one share breaks the batch structurally
    qard.share.data.pop();
    let err = restore_text(&[qard.encode(), shares[1].clone()], PASSWORD, None).unwrap_err();
    assert!(matches!(err, VaultError::Shamir(ShamirError::Combine(_))));
}

#[test]
fn test_flipped_salt() {
    let shares = shares_2_of_3(None);
    let mut a = Qard::parse(&shares[0]).unwrap();
    let mut b = Qard::parse(&shares[2]).unwrap();

    // One share with a different salt: caught before key derivation
    a.salt[3] ^= 0x80;
    let err = restore_text(&[a.encode(), b.encode()], PASSWORD, None).unwrap_err();
    assert_eq!(err, VaultError::Shamir(ShamirError::MixedSets));

    // Both flipped the same way: derives a different key
    b.salt[3] ^= 0x80;
    let err = restore_text(&[a.encode(), b.encode()], PASSWORD, None).unwrap_err();
    assert!(err.is_authentication());
}

#[test]
fn test_mixed_sets_rejected() {
    let first = shares_2_of_3(None);
    let second = shares_2_of_3(None);
    let err = restore_text(&[&first[0], &second[1]], PASSWORD, None).unwrap_err();
    assert_eq!(err, VaultError::Shamir(ShamirError::MixedSets));
}

#[test]
fn test_duplicate_share_rejected() {
    let shares = shares_2_of_3(None);
    let err = restore_text(&[&shares[1], &shares[1]], PASSWORD, None).unwrap_err();
    assert!(matches!(err, VaultError::Shamir(ShamirError::Combine(_))));
}

#[test]
fn test_tampered_encrypted_vault_file() {
    let set = split_text(SECRET, PASSWORD, None, ShamirConfig::two_of_three()).unwrap();
    let mut sealed = ExportedVault::from_share_set(&set, "Vault", false, None)
        .encrypt("vault password")
        .unwrap();

    let mut data = STANDARD.decode(&sealed.data).unwrap();
    let middle = data.len() / 2;
    data[middle] ^= 0x10;
    sealed.data = STANDARD.encode(&data);

    let json = sealed.to_json().unwrap();
    let err = VaultFile::parse(&json)
        .unwrap()
        .into_vault(Some("vault password"))
        .unwrap_err();
    assert!(err.is_authentication());
}

// ============================================================================
// 3. Below threshold
// ============================================================================

#[test]
fn test_below_threshold_is_rejected_early() {
    let set = split_text(SECRET, PASSWORD, None, ShamirConfig::three_of_five()).unwrap();
    let shares = set.to_strings();

    let err = restore_text(&shares[..2], PASSWORD, None).unwrap_err();
    assert_eq!(
        err,
        VaultError::Shamir(ShamirError::InsufficientShares { have: 2, need: 3 })
    );
}

#[test]
fn test_below_threshold_interpolation_never_authenticates() {
    let set = split_text(SECRET, PASSWORD, None, ShamirConfig::three_of_five()).unwrap();
    let qards = set.shares();

    // Bypass the threshold check and interpolate two of three
    let partial: Vec<Share> = qards[..2].iter().map(|q| q.share.clone()).collect();
    let garbage = reconstruct_secret(&partial).unwrap();
    let err = decrypt_parts(&qards[0].salt, &garbage, PASSWORD.as_bytes(), None).unwrap_err();
    assert_eq!(err, CoreError::Authentication);
}

#[test]
fn test_truncated_ciphertext() {
    let salt = [7u8; 16];
    for len in [0, 1, 23, 24, 39] {
        let data = vec![0u8; len];
        assert_eq!(
            decrypt_parts(&salt, &data, PASSWORD.as_bytes(), None).unwrap_err(),
            CoreError::Authentication,
            "length {}",
            len
        );
    }

    let blob = backend::create(b"short", PASSWORD, None).unwrap();
    let data = STANDARD.decode(&blob.data).unwrap();
    let truncated = STANDARD.encode(&data[..data.len() - 1]);
    assert_eq!(
        backend::restore(&blob.salt, &truncated, PASSWORD, None).unwrap_err(),
        CoreError::Authentication
    );
}

// ============================================================================
// 4. Malformed input
// ============================================================================

#[test]
fn test_malformed_qards_dont_panic() {
    let inputs = [
        "",
        "seQRets",
        "seQRets||",
        "seQRets|AAAAAAAAAAAAAAAAAAAAAA==",
        "seQRets|AAAAAAAAAAAAAAAAAAAAAA==|",
        "seQRets|AAAAAAAAAAAAAAAAAAAAAA==|AQI=",
        "seQRets|AAAAAAAAAAAAAAAAAAAAAA==|AAKr",
        "seQRets|AAAAAAAAAAAAAAAAAAAAAA==|AQCr",
        "seQRets|AAAA|AQKr",
        "seQRets|not base64!|AQKr",
        "seQRets|AAAAAAAAAAAAAAAAAAAAAA==|AQKr|extra",
        "SEQRETS|AAAAAAAAAAAAAAAAAAAAAA==|AQKr",
        "||||||||",
        "\u{0}\u{0}\u{0}",
    ];
    for input in inputs {
        assert!(
            matches!(Qard::parse(input), Err(ShamirError::Format(_))),
            "{:?} should be a format error",
            input
        );
    }
}

#[test]
fn test_random_garbage_doesnt_panic() {
    let mut rng = rand::thread_rng();
    for _ in 0..1000 {
        let len = rng.gen_range(0..200);
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes);
        let text = String::from_utf8_lossy(&bytes);

        let _ = Qard::parse(&text);
        let _ = VaultFile::parse(&text);

        // Random fragments behind a valid prefix
        let framed = format!("seQRets|AAAAAAAAAAAAAAAAAAAAAA==|{}", STANDARD.encode(&bytes));
        if let Ok(qard) = Qard::parse(&framed) {
            assert_eq!(qard.share.data.len(), len - 2);
        }
    }
}

#[test]
fn test_random_payload_bytes_dont_panic() {
    let mut rng = rand::thread_rng();
    for _ in 0..1000 {
        let len = rng.gen_range(0..128);
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes);
        if let Ok(payload) = seqrets_core::Payload::from_bytes(&bytes) {
            let _ = seqrets_core::expand(&payload);
        }
        let _ = seqrets_core::SecretPayload::from_bytes(&bytes);
    }
}
