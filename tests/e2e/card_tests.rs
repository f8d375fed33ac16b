//! Smart card flows against the simulated reader backend.
//!
//! Shares and vault files go onto cards, come back off them, and restore the
//! secret. Reader contention and a card pulled mid-session are exercised
//! from the outside, the way a user would hit them.

use std::thread;
use std::time::Duration;

use seqrets_card::{
    CancelToken, CardError, CardManager, ItemKind, SimulatedApplet, SimulatedBackend,
};
use seqrets_shamir::ShamirConfig;
use seqrets_vault::{restore_text, split_text, ExportedVault, VaultFile};

const PASSWORD: &str = "correct horse battery staple long";
const SECRET: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const PIN: &str = "24681357";

fn backend_with_readers(count: usize) -> (SimulatedBackend, Vec<String>) {
    let backend = SimulatedBackend::new();
    let readers: Vec<String> = (0..count).map(|i| format!("Sim Reader {}", i)).collect();
    for reader in &readers {
        backend.insert_card(reader, SimulatedApplet::new().with_pin(PIN));
    }
    (backend, readers)
}

#[test]
fn test_one_share_per_card_then_restore() {
    let (backend, readers) = backend_with_readers(3);
    let manager = CardManager::new(backend);
    let cancel = CancelToken::new();

    let shares = split_text(SECRET, PASSWORD, None, ShamirConfig::two_of_three())
        .unwrap()
        .to_strings();
    for (i, (reader, share)) in readers.iter().zip(&shares).enumerate() {
        let label = format!("Share {}", i + 1);
        manager
            .write_share(reader, share, &label, Some(PIN), &cancel)
            .unwrap();
    }

    // Without the PIN nothing comes off
    assert_eq!(
        manager.read_items(&readers[0], None, &cancel).unwrap_err(),
        CardError::PinRequired
    );

    // Collect from two cards
    let mut collected = Vec::new();
    for reader in [&readers[2], &readers[0]] {
        let items = manager.read_items(reader, Some(PIN), &cancel).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, ItemKind::Share);
        collected.push(items[0].payload_str().unwrap().to_owned());
    }
    assert_eq!(collected[0], shares[2]);

    let restored = restore_text(&collected, PASSWORD, None).unwrap();
    assert_eq!(restored.as_str(), SECRET);
}

#[test]
fn test_vault_and_keyfile_on_one_card() {
    let (backend, readers) = backend_with_readers(1);
    let reader = &readers[0];
    let manager = CardManager::new(backend);
    let cancel = CancelToken::new();

    let keyfile = seqrets_core::generate_keyfile();
    let set = split_text(SECRET, PASSWORD, Some(keyfile.as_slice()), ShamirConfig::three_of_five())
        .unwrap();
    let sealed = ExportedVault::from_share_set(&set, "Card vault", true, None)
        .encrypt("vault password")
        .unwrap()
        .to_json()
        .unwrap();

    manager
        .write_vault(reader, &sealed, "Card vault", Some(PIN), &cancel)
        .unwrap();
    manager
        .write_keyfile(reader, &keyfile, "Keyfile", Some(PIN), &cancel)
        .unwrap();

    let status = manager.status(reader, Some(PIN), &cancel).unwrap();
    assert_eq!(status.item_count, Some(2));
    assert_eq!(status.data_type, Some(ItemKind::Vault));
    assert_eq!(status.label, "Card vault");
    assert!(status.pin_verified);

    let items = manager.read_items(reader, Some(PIN), &cancel).unwrap();
    let vault_json = items[0].payload_str().unwrap();
    let card_keyfile = &items[1].payload;
    assert_eq!(card_keyfile.as_slice(), keyfile.as_slice());

    let vault = VaultFile::parse(vault_json)
        .unwrap()
        .into_vault(Some("vault password"))
        .unwrap();
    assert!(vault.keyfile_used);
    let restored = restore_text(&vault.shares[2..], PASSWORD, Some(card_keyfile.as_slice())).unwrap();
    assert_eq!(restored.as_str(), SECRET);
}

#[test]
fn test_clone_then_restore_from_copy() {
    let (backend, readers) = backend_with_readers(1);
    backend.insert_card("Sim Reader 9", SimulatedApplet::new());
    let manager = CardManager::new(backend.clone());
    let cancel = CancelToken::new();

    let shares = split_text(SECRET, PASSWORD, None, ShamirConfig::new(1, 2))
        .unwrap()
        .to_strings();
    manager
        .write_share(&readers[0], &shares[0], "Share 1", Some(PIN), &cancel)
        .unwrap();

    let copied = manager
        .clone_card(&readers[0], "Sim Reader 9", Some(PIN), Some("11223344"), &cancel)
        .unwrap();
    assert_eq!(copied, 1);

    // The original leaves; the copy is enough
    backend.remove_card(&readers[0]);
    let items = manager
        .read_items("Sim Reader 9", Some("11223344"), &cancel)
        .unwrap();
    let restored = restore_text(&[items[0].payload_str().unwrap()], PASSWORD, None).unwrap();
    assert_eq!(restored.as_str(), SECRET);
}

#[test]
fn test_busy_reader_across_threads() {
    let backend = SimulatedBackend::new().with_latency(Duration::from_millis(20));
    backend.insert_card("Sim Reader 0", SimulatedApplet::new());
    let manager = CardManager::new(backend.clone());

    let payload = "v".repeat(4000);
    thread::scope(|s| {
        let writer = s.spawn(|| {
            manager.write_vault("Sim Reader 0", &payload, "Big", None, &CancelToken::new())
        });

        // Wait until the transfer is under way
        while backend
            .with_card("Sim Reader 0", |c| c.commands_processed())
            .unwrap_or(0)
            < 2
        {
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(
            manager.status("Sim Reader 0", None, &CancelToken::new()),
            Err(CardError::Busy("Sim Reader 0".into()))
        );
        writer.join().unwrap().unwrap();
    });

    // Released once the writer finished
    let status = manager
        .status("Sim Reader 0", None, &CancelToken::new())
        .unwrap();
    assert_eq!(status.item_count, Some(1));
}

#[test]
fn test_card_pulled_and_reinserted() {
    let (backend, readers) = backend_with_readers(1);
    let reader = &readers[0];
    let manager = CardManager::new(backend.clone());
    let cancel = CancelToken::new();

    manager
        .write_share(reader, "seQRets|AAAAAAAAAAAAAAAAAAAAAA==|AQKr", "Share 1", Some(PIN), &cancel)
        .unwrap();

    backend.unplug_after(reader, 0);
    assert!(matches!(
        manager.read_items(reader, Some(PIN), &cancel),
        Err(CardError::Disconnected(_))
    ));

    // The failed read left nothing behind: no lease, no PIN strike
    backend.reinsert(reader);
    let items = manager.read_items(reader, Some(PIN), &cancel).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].label, "Share 1");
    assert_eq!(
        backend.with_card(reader, |c| c.pin_tries_remaining()),
        Some(seqrets_card::MAX_PIN_TRIES)
    );
}

#[test]
fn test_empty_reader_and_missing_applet() {
    let backend = SimulatedBackend::new();
    backend.add_reader("Empty");
    backend.insert_card("Blank", SimulatedApplet::without_applet());
    let manager = CardManager::new(backend);
    let cancel = CancelToken::new();

    assert!(matches!(
        manager.status("Empty", None, &cancel),
        Err(CardError::Disconnected(_))
    ));
    assert_eq!(
        manager.status("Blank", None, &cancel),
        Err(CardError::AppletNotFound)
    );
    assert_eq!(
        manager.list_readers().unwrap(),
        vec!["Blank".to_string(), "Empty".to_string()]
    );
}
