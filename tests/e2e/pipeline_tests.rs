//! End-to-end tests of the secure path.
//!
//! secret → compact → compress → Argon2id → XChaCha20-Poly1305 → Shamir →
//! Qard strings, and back, plus the vault and instruction formats built on
//! top of it.

use seqrets_core::{backend, compact, FileRecord, SecretPayload};
use seqrets_shamir::{Qard, ShamirConfig, ShamirError};
use seqrets_vault::{
    create_share_set, restore_payload, restore_text, split_text, EncryptedInstruction,
    ExportedVault, InstructionContent, ShareSet, VaultError, VaultFile,
};
use serde_json::json;

const UPPER_MNEMONIC: &str = "ABANDON ABANDON ABANDON ABANDON ABANDON ABANDON ABANDON ABANDON ABANDON ABANDON ABANDON ABOUT";
const PASSWORD: &str = "correct horse battery staple long";

const MNEMONIC_24: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon art";

// ============================================================================
// 1. Example scenario
// ============================================================================

#[test]
fn test_uppercase_mnemonic_two_of_three() {
    let set = split_text(UPPER_MNEMONIC, PASSWORD, None, ShamirConfig::two_of_three()).unwrap();
    let shares = set.to_strings();
    assert_eq!(shares.len(), 3);

    // One salt across the set
    let salts: Vec<String> = shares
        .iter()
        .map(|s| s.split('|').nth(1).unwrap().to_owned())
        .collect();
    assert!(salts.iter().all(|s| s == &salts[0]));

    // Any two restore the exact words
    for (a, b) in [(0, 1), (0, 2), (1, 2), (2, 0)] {
        let restored = restore_text(&[&shares[a], &shares[b]], PASSWORD, None).unwrap();
        assert_eq!(restored.as_str(), UPPER_MNEMONIC, "pair ({}, {})", a, b);
    }

    // All three work as well
    let restored = restore_text(&shares, PASSWORD, None).unwrap();
    assert_eq!(restored.as_str(), UPPER_MNEMONIC);

    // Wrong password
    let err = restore_text(&shares[..2], "correct horse battery staple short", None).unwrap_err();
    assert!(err.is_authentication());

    // One share is rejected as insufficient before any decryption
    let err = restore_text(&shares[..1], PASSWORD, None).unwrap_err();
    assert_eq!(
        err,
        VaultError::Shamir(ShamirError::InsufficientShares { have: 1, need: 2 })
    );
}

// ============================================================================
// 2. Compaction through the full path
// ============================================================================

#[test]
fn test_mnemonic_compaction_sizes() {
    let twelve = compact(&UPPER_MNEMONIC.to_lowercase());
    assert!(twelve.is_mnemonic());
    // tag + u32 length + 16 bytes entropy
    assert_eq!(twelve.to_bytes().len(), 1 + 4 + 16);

    let twenty_four = compact(MNEMONIC_24);
    assert!(twenty_four.is_mnemonic());
    assert_eq!(twenty_four.to_bytes().len(), 1 + 4 + 32);

    // Right shape, wrong checksum: kept as text
    let bad_checksum = ["abandon"; 12].join(" ");
    assert!(!compact(&bad_checksum).is_mnemonic());
}

#[test]
fn test_24_word_and_multi_line_roundtrip() {
    let secret = format!(
        "{}\nwallet passphrase: hunter2\n{}",
        MNEMONIC_24,
        UPPER_MNEMONIC.to_lowercase()
    );
    let set = split_text(&secret, PASSWORD, None, ShamirConfig::three_of_five()).unwrap();
    let shares = set.to_strings();
    assert_eq!(shares.len(), 5);

    let restored = restore_text(&[&shares[4], &shares[0], &shares[2]], PASSWORD, None).unwrap();
    assert_eq!(restored.as_str(), secret);
}

#[test]
fn test_freeform_text_with_keyfile() {
    let keyfile = seqrets_core::generate_keyfile();
    let secret = "PIN 0000 for the safe deposit box ✓";
    let set = split_text(secret, PASSWORD, Some(keyfile.as_slice()), ShamirConfig::new(2, 4)).unwrap();
    let shares = set.to_strings();

    let restored = restore_text(&shares[2..], PASSWORD, Some(keyfile.as_slice())).unwrap();
    assert_eq!(restored.as_str(), secret);

    // The keyfile is part of the key
    let err = restore_text(&shares[2..], PASSWORD, None).unwrap_err();
    assert!(err.is_authentication());
}

#[test]
fn test_file_payload_roundtrip() {
    let content: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
    let record = FileRecord::new("wallet.dat", &content, "application/octet-stream");
    let payload = SecretPayload::File(record.clone());

    let set = create_share_set(&payload, PASSWORD, None, ShamirConfig::two_of_three()).unwrap();
    match restore_payload(&set.to_strings()[1..], PASSWORD, None).unwrap() {
        SecretPayload::File(restored) => {
            assert_eq!(restored, record);
            assert_eq!(restored.content().unwrap().as_slice(), content.as_slice());
        }
        other => panic!("expected a file payload, got {:?}", other),
    }

    // Asking for text gets a format error, not garbage
    assert!(matches!(
        restore_text(&set.to_strings(), PASSWORD, None),
        Err(VaultError::Format(_))
    ));
}

#[test]
fn test_degenerate_one_of_one() {
    let set = split_text("solo", PASSWORD, None, ShamirConfig::new(1, 1)).unwrap();
    let shares = set.to_strings();
    assert_eq!(shares.len(), 1);
    assert_eq!(restore_text(&shares, PASSWORD, None).unwrap().as_str(), "solo");
}

#[test]
fn test_invalid_configurations_rejected_before_crypto() {
    for (t, n) in [(0, 3), (4, 3), (2, 1), (0, 0)] {
        let err = split_text("secret", PASSWORD, None, ShamirConfig::new(t, n)).unwrap_err();
        assert!(
            matches!(err, VaultError::Shamir(ShamirError::Configuration(_))),
            "{}-of-{} gave {:?}",
            t,
            n,
            err
        );
    }
}

// ============================================================================
// 3. Vault export
// ============================================================================

#[test]
fn test_vault_export_roundtrip() {
    let set = split_text(UPPER_MNEMONIC, PASSWORD, None, ShamirConfig::two_of_three()).unwrap();
    let vault = ExportedVault::from_share_set(&set, "Family backup", false, None);
    assert_eq!(vault.set_id, set.set_id());
    assert_eq!(vault.set_id.len(), 8);

    let json = vault.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["version"], 1);
    assert_eq!(value["requiredShares"], 2);
    assert_eq!(value["totalShares"], 3);
    assert_eq!(value["keyfileUsed"], false);
    assert!(value.get("encryptedInstructions").is_none());

    let reimported = ExportedVault::from_json(&json).unwrap();
    let set2: ShareSet = reimported.share_set().unwrap();
    assert_eq!(set2, set);

    let restored = restore_text(&reimported.shares, PASSWORD, None).unwrap();
    assert_eq!(restored.as_str(), UPPER_MNEMONIC);
}

#[test]
fn test_encrypted_vault_file() {
    let set = split_text("vaulted", PASSWORD, None, ShamirConfig::two_of_three()).unwrap();
    let vault = ExportedVault::from_share_set(&set, "Vault", false, None);
    let json = vault.to_json().unwrap();

    let sealed = vault.encrypt("a different vault password").unwrap();
    let sealed_json = sealed.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&sealed_json).unwrap();
    assert_eq!(value["version"], 2);
    assert_eq!(value["encrypted"], true);

    // Decrypts to byte-identical JSON
    match VaultFile::parse(&sealed_json).unwrap() {
        VaultFile::Encrypted(file) => {
            let opened = file.open_json("a different vault password").unwrap();
            assert_eq!(opened.as_str(), json);

            let err = file.open_json(PASSWORD).unwrap_err();
            assert!(err.is_authentication());
        }
        VaultFile::Plain(_) => panic!("expected an encrypted vault file"),
    }

    // Plain files dispatch the other way
    assert!(matches!(
        VaultFile::parse(&json).unwrap(),
        VaultFile::Plain(_)
    ));
}

#[test]
fn test_vault_with_plan_instructions() {
    let keyfile = seqrets_core::generate_keyfile();
    let set = split_text("with plan", PASSWORD, Some(keyfile.as_slice()), ShamirConfig::two_of_three()).unwrap();

    let plan = json!({
        "beneficiaries": [{"name": "Alice", "share": 1}],
        "notes": "Hardware wallet is in the safe",
    });
    let record = InstructionContent::plan_record(&plan).unwrap();
    let instruction = EncryptedInstruction::encrypt(&record, PASSWORD, Some(keyfile.as_slice())).unwrap();

    let vault = ExportedVault::from_share_set(&set, "Estate", true, Some(instruction));
    let sealed = vault.encrypt("vault pw").unwrap().to_json().unwrap();

    let reopened = VaultFile::parse(&sealed)
        .unwrap()
        .into_vault(Some("vault pw"))
        .unwrap();
    assert!(reopened.keyfile_used);
    let instruction = reopened.encrypted_instructions.as_ref().unwrap();
    match instruction.open(PASSWORD, Some(keyfile.as_slice())).unwrap() {
        InstructionContent::Plan(opened) => assert_eq!(opened, plan),
        InstructionContent::File(f) => panic!("expected a plan, got file {:?}", f.file_name),
    }

    let restored = restore_text(&reopened.shares[..2], PASSWORD, Some(keyfile.as_slice())).unwrap();
    assert_eq!(restored.as_str(), "with plan");
}

#[test]
fn test_instruction_document_stays_a_file() {
    let record = FileRecord::new("letter.pdf", b"%PDF-1.7 ...", "application/pdf");
    let instruction = EncryptedInstruction::encrypt(&record, PASSWORD, None).unwrap();
    let json = instruction.to_json().unwrap();

    let parsed = EncryptedInstruction::from_json(&json).unwrap();
    match parsed.open(PASSWORD, None).unwrap() {
        InstructionContent::File(opened) => assert_eq!(opened, record),
        InstructionContent::Plan(_) => panic!("a PDF is not a plan"),
    }
}

// ============================================================================
// 4. Backend request/response facade
// ============================================================================

#[test]
fn test_backend_facade_matches_share_pipeline() {
    let payload = compact("facade secret").to_bytes();
    let blob = backend::create(&payload, PASSWORD, None).unwrap();

    // Split the returned data by hand and recombine through Qards
    let salt = seqrets_core::crypto::decode_salt(&blob.salt).unwrap();
    let data = base64_decode(&blob.data);
    let qards = seqrets_shamir::split_to_qards(&salt, &data, ShamirConfig::two_of_three()).unwrap();
    let strings: Vec<String> = qards.iter().map(Qard::encode).collect();

    let restored = restore_text(&strings[1..], PASSWORD, None).unwrap();
    assert_eq!(restored.as_str(), "facade secret");

    let json = r#"{"hello":"world"}"#;
    let sealed = backend::encrypt_blob(json, PASSWORD, None).unwrap();
    let opened = backend::decrypt_blob(&sealed.salt, &sealed.data, PASSWORD, None).unwrap();
    assert_eq!(opened.as_str(), json);
}

fn base64_decode(s: &str) -> Vec<u8> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD.decode(s).unwrap()
}
