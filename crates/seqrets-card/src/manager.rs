//! Card operations
//!
//! [`CardManager`] is the entry point: it owns a backend, hands out
//! exclusive use of each reader, applies the PIN policy and keeps the
//! multi-item layout consistent.
//!
//! Every write reads the current items, checks capacity, and rewrites the
//! whole layout as one staged transfer. A write that is cancelled or loses
//! the card halfway leaves the previous items in place.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use zeroize::Zeroizing;

use crate::backend::{CancelToken, CardBackend};
use crate::error::CardError;
use crate::layout::{self, CardItem, ItemKind};
use crate::pin::{validate_new_pin, PinTracker, MAX_PIN_TRIES};
use crate::session::{RawStatus, Session};

/// What GET_STATUS reports, plus the item count when the data is readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardStatus {
    pub has_data: bool,
    pub data_length: u16,
    /// Type byte of the stored data; `None` when empty or unrecognised
    pub data_type: Option<ItemKind>,
    pub label: String,
    pub pin_set: bool,
    pub pin_verified: bool,
    pub pin_tries_remaining: Option<u8>,
    pub item_count: Option<usize>,
}

/// Exclusive use of one reader; released on drop.
struct ReaderLease<'m> {
    in_use: &'m Mutex<HashSet<String>>,
    reader: String,
}

impl Drop for ReaderLease<'_> {
    fn drop(&mut self) {
        self.in_use
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.reader);
    }
}

pub struct CardManager {
    backend: Box<dyn CardBackend>,
    in_use: Mutex<HashSet<String>>,
    pins: PinTracker,
}

impl CardManager {
    pub fn new(backend: impl CardBackend + 'static) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    pub fn from_boxed(backend: Box<dyn CardBackend>) -> Self {
        Self {
            backend,
            in_use: Mutex::new(HashSet::new()),
            pins: PinTracker::default(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn list_readers(&self) -> Result<Vec<String>, CardError> {
        let readers = self.backend.list_readers()?;
        log::debug!("{} backend lists {} readers", self.backend.name(), readers.len());
        Ok(readers)
    }

    /// PIN attempts left before the host refuses to verify, as last seen.
    pub fn pin_tries_remaining(&self, reader: &str) -> u8 {
        self.pins.remaining(reader)
    }

    fn lease(&self, reader: &str) -> Result<ReaderLease<'_>, CardError> {
        let mut in_use = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_use.insert(reader.to_owned()) {
            log::debug!("reader {} is busy", reader);
            return Err(CardError::Busy(reader.to_owned()));
        }
        Ok(ReaderLease {
            in_use: &self.in_use,
            reader: reader.to_owned(),
        })
    }

    /// Connect, select, sync the PIN count and verify `pin` when the card has one.
    fn open(
        &self,
        reader: &str,
        pin: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<(Session<'_>, RawStatus), CardError> {
        let pin = pin.filter(|p| !p.is_empty());
        if pin.is_some() {
            self.pins.check(reader)?;
        }

        let mut session = Session::open(self.backend.as_ref(), reader, cancel)?;
        let mut status = session.status()?;
        if let (true, Some(tries)) = (status.pin_set, status.tries_remaining) {
            self.pins.sync(reader, tries);
        }

        if let Some(pin) = pin {
            if status.pin_set {
                self.verify_in(&mut session, reader, pin)?;
                status.pin_verified = true;
                status.tries_remaining = status.tries_remaining.map(|_| MAX_PIN_TRIES);
            } else {
                log::debug!("card in {} has no PIN; ignoring the one supplied", reader);
            }
        }
        Ok((session, status))
    }

    fn verify_in(&self, session: &mut Session<'_>, reader: &str, pin: &str) -> Result<(), CardError> {
        self.pins.check(reader)?;
        let outcome = session.verify_pin(pin);
        self.pins.record(reader, &outcome);
        outcome
    }

    fn read_in(session: &mut Session<'_>, status: &RawStatus) -> Result<Vec<CardItem>, CardError> {
        if status.data_length == 0 {
            return Ok(Vec::new());
        }
        let blob = session.read_blob(status.data_length as usize)?;
        layout::decode_items(&blob, status.data_type, &status.label)
    }

    /// Replace the card contents with `items` in one staged transfer.
    fn store_in(session: &mut Session<'_>, items: &[CardItem]) -> Result<(), CardError> {
        let Some(first) = items.first() else {
            return session.erase();
        };
        let blob = Zeroizing::new(layout::encode_items(items)?);
        session.write_blob(&blob, first.kind.to_byte(), &first.label)
    }

    pub fn status(
        &self,
        reader: &str,
        pin: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<CardStatus, CardError> {
        let _lease = self.lease(reader)?;
        let (mut session, status) = self.open(reader, pin, cancel)?;

        let readable = !status.pin_set || status.pin_verified;
        let item_count = if status.data_length > 0 && readable {
            Some(Self::read_in(&mut session, &status)?.len())
        } else if status.data_length == 0 {
            Some(0)
        } else {
            None
        };

        Ok(CardStatus {
            has_data: status.data_length > 0,
            data_length: status.data_length,
            data_type: ItemKind::from_byte(status.data_type).filter(|_| status.data_length > 0),
            label: status.label,
            pin_set: status.pin_set,
            pin_verified: status.pin_verified,
            pin_tries_remaining: status.tries_remaining.filter(|_| status.pin_set),
            item_count,
        })
    }

    /// All items on the card, in write order.
    pub fn read_items(
        &self,
        reader: &str,
        pin: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Vec<CardItem>, CardError> {
        let _lease = self.lease(reader)?;
        let (mut session, status) = self.open(reader, pin, cancel)?;
        let items = Self::read_in(&mut session, &status)?;
        log::info!("read {} items from {}", items.len(), reader);
        Ok(items)
    }

    /// Append an item after the existing ones.
    ///
    /// Fails with [`CardError::CapacityExceeded`] before anything is sent
    /// when the item does not fit.
    pub fn write_item(
        &self,
        reader: &str,
        item: CardItem,
        pin: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<(), CardError> {
        if item.payload.is_empty() {
            return Err(CardError::Format(format!("empty {} item", item.kind)));
        }
        let _lease = self.lease(reader)?;
        let (mut session, status) = self.open(reader, pin, cancel)?;

        let mut items = Self::read_in(&mut session, &status)?;
        let kind = item.kind;
        items.push(item);
        layout::check_capacity(&items)?;

        Self::store_in(&mut session, &items)?;
        log::info!(
            "wrote {} item to {} ({} items, {} bytes used)",
            kind,
            reader,
            items.len(),
            layout::used_capacity(&items)
        );
        Ok(())
    }

    pub fn write_share(
        &self,
        reader: &str,
        share: &str,
        label: &str,
        pin: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<(), CardError> {
        let item = CardItem::new(ItemKind::Share, label, share.trim().as_bytes().to_vec());
        self.write_item(reader, item, pin, cancel)
    }

    pub fn write_vault(
        &self,
        reader: &str,
        vault_json: &str,
        label: &str,
        pin: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<(), CardError> {
        let item = CardItem::new(ItemKind::Vault, label, vault_json.as_bytes().to_vec());
        self.write_item(reader, item, pin, cancel)
    }

    pub fn write_keyfile(
        &self,
        reader: &str,
        keyfile: &[u8],
        label: &str,
        pin: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<(), CardError> {
        let item = CardItem::new(ItemKind::Keyfile, label, keyfile.to_vec());
        self.write_item(reader, item, pin, cancel)
    }

    pub fn write_instruction(
        &self,
        reader: &str,
        instruction_json: &str,
        label: &str,
        pin: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<(), CardError> {
        let item = CardItem::new(ItemKind::Instruction, label, instruction_json.as_bytes().to_vec());
        self.write_item(reader, item, pin, cancel)
    }

    /// Remove every item.
    pub fn erase(
        &self,
        reader: &str,
        pin: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<(), CardError> {
        let _lease = self.lease(reader)?;
        let (mut session, _) = self.open(reader, pin, cancel)?;
        session.erase()
    }

    /// Remove the item at `index` (as returned by [`read_items`](Self::read_items)).
    pub fn erase_item(
        &self,
        reader: &str,
        index: usize,
        pin: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<(), CardError> {
        let _lease = self.lease(reader)?;
        let (mut session, status) = self.open(reader, pin, cancel)?;

        let mut items = Self::read_in(&mut session, &status)?;
        if index >= items.len() {
            return Err(CardError::ItemNotFound(index));
        }
        let removed = items.remove(index);
        Self::store_in(&mut session, &items)?;
        log::info!("erased {} item {} from {}", removed.kind, index, reader);
        Ok(())
    }

    /// Check a PIN. Refused locally once the card has used up its tries.
    pub fn verify_pin(&self, reader: &str, pin: &str) -> Result<(), CardError> {
        self.pins.check(reader)?;
        let _lease = self.lease(reader)?;
        let (mut session, status) = self.open(reader, None, &CancelToken::new())?;
        if !status.pin_set {
            return Err(CardError::InvalidPin("card has no PIN set".into()));
        }
        self.verify_in(&mut session, reader, pin)
    }

    /// Set the first PIN on a card that has none.
    pub fn set_pin(&self, reader: &str, pin: &str) -> Result<(), CardError> {
        validate_new_pin(pin)?;
        let _lease = self.lease(reader)?;
        let (mut session, status) = self.open(reader, None, &CancelToken::new())?;
        if status.pin_set {
            return Err(CardError::InvalidPin(
                "card already has a PIN; change it instead".into(),
            ));
        }
        session.set_pin(pin)?;
        self.pins.sync(reader, MAX_PIN_TRIES);
        log::info!("set PIN on card in {}", reader);
        Ok(())
    }

    /// Replace the PIN. A wrong current PIN counts as a failed attempt.
    pub fn change_pin(&self, reader: &str, old_pin: &str, new_pin: &str) -> Result<(), CardError> {
        validate_new_pin(new_pin)?;
        self.pins.check(reader)?;
        let _lease = self.lease(reader)?;
        let (mut session, status) = self.open(reader, None, &CancelToken::new())?;
        if !status.pin_set {
            return Err(CardError::InvalidPin("card has no PIN set".into()));
        }
        self.pins.check(reader)?;
        let outcome = session.change_pin(old_pin, new_pin);
        self.pins.record(reader, &outcome);
        outcome?;
        log::info!("changed PIN on card in {}", reader);
        Ok(())
    }

    /// Copy every item from `source` to `destination`, replacing what the
    /// destination held.
    ///
    /// The source is read completely before the destination is touched.
    /// When the destination has no PIN and `destination_pin` is given, it
    /// is set on the copy. Returns the number of items copied.
    pub fn clone_card(
        &self,
        source: &str,
        destination: &str,
        source_pin: Option<&str>,
        destination_pin: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<usize, CardError> {
        if source == destination {
            return Err(CardError::SameReader);
        }

        let _source_lease = self.lease(source)?;
        let _destination_lease = self.lease(destination)?;

        let items = {
            let (mut session, status) = self.open(source, source_pin, cancel)?;
            Self::read_in(&mut session, &status)?
        };
        if items.is_empty() {
            return Err(CardError::NoData);
        }
        layout::check_capacity(&items)?;
        log::info!("read {} items from {} for cloning", items.len(), source);

        let (mut session, status) = self.open(destination, destination_pin, cancel)?;
        if let Some(pin) = destination_pin.filter(|p| !p.is_empty() && !status.pin_set) {
            validate_new_pin(pin)?;
            session.set_pin(pin)?;
            self.pins.sync(destination, MAX_PIN_TRIES);
        }
        Self::store_in(&mut session, &items)?;

        log::info!("cloned {} items from {} to {}", items.len(), source, destination);
        Ok(items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ITEM_CAPACITY, LAYOUT_MAGIC, MAX_ITEMS};
    use crate::sim::{SimulatedApplet, SimulatedBackend};

    const READER: &str = "Sim Reader 0";
    const PIN: &str = "12345678";

    fn manager_with(card: SimulatedApplet) -> (SimulatedBackend, CardManager) {
        let backend = SimulatedBackend::new();
        backend.insert_card(READER, card);
        (backend.clone(), CardManager::new(backend))
    }

    #[test]
    fn test_append_and_read_items() {
        let (_, manager) = manager_with(SimulatedApplet::new());
        let cancel = CancelToken::new();

        manager
            .write_share(READER, "seQRets|a|b\n", "Share 1", None, &cancel)
            .unwrap();
        manager
            .write_keyfile(READER, &[0xAB; 32], "Keyfile", None, &cancel)
            .unwrap();

        let items = manager.read_items(READER, None, &cancel).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, ItemKind::Share);
        assert_eq!(items[0].payload_str().unwrap(), "seQRets|a|b");
        assert_eq!(items[1].kind, ItemKind::Keyfile);
        assert_eq!(items[1].payload, vec![0xAB; 32]);

        let status = manager.status(READER, None, &cancel).unwrap();
        assert!(status.has_data);
        assert_eq!(status.item_count, Some(2));
        assert_eq!(status.data_type, Some(ItemKind::Share));
        assert_eq!(status.label, "Share 1");
        assert!(!status.pin_set);
        assert_eq!(status.pin_tries_remaining, None);
    }

    #[test]
    fn test_status_json() {
        let (_, manager) = manager_with(SimulatedApplet::new());
        let status = manager.status(READER, None, &CancelToken::new()).unwrap();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "hasData": false,
                "dataLength": 0,
                "dataType": null,
                "label": "",
                "pinSet": false,
                "pinVerified": false,
                "pinTriesRemaining": null,
                "itemCount": 0,
            })
        );
    }

    #[test]
    fn test_erase_item_and_erase_all() {
        let (backend, manager) = manager_with(SimulatedApplet::new());
        let cancel = CancelToken::new();
        for i in 0..3 {
            manager
                .write_share(READER, &format!("share {}", i), &i.to_string(), None, &cancel)
                .unwrap();
        }

        manager.erase_item(READER, 1, None, &cancel).unwrap();
        let labels: Vec<String> = manager
            .read_items(READER, None, &cancel)
            .unwrap()
            .iter()
            .map(|i| i.label.clone())
            .collect();
        assert_eq!(labels, vec!["0", "2"]);

        assert_eq!(
            manager.erase_item(READER, 5, None, &cancel),
            Err(CardError::ItemNotFound(5))
        );

        manager.erase(READER, None, &cancel).unwrap();
        assert!(manager.read_items(READER, None, &cancel).unwrap().is_empty());
        assert_eq!(backend.with_card(READER, |c| c.stored_data().len()), Some(0));
    }

    #[test]
    fn test_erasing_last_item_clears_card() {
        let (backend, manager) = manager_with(SimulatedApplet::new());
        let cancel = CancelToken::new();
        manager.write_share(READER, "only", "", None, &cancel).unwrap();
        manager.erase_item(READER, 0, None, &cancel).unwrap();
        assert_eq!(backend.with_card(READER, |c| c.stored_data().len()), Some(0));
    }

    #[test]
    fn test_pin_protected_card() {
        let (_, manager) = manager_with(SimulatedApplet::new().with_pin(PIN));
        let cancel = CancelToken::new();

        assert_eq!(
            manager.write_share(READER, "s", "", None, &cancel),
            Err(CardError::PinRequired)
        );
        manager.write_share(READER, "s", "", Some(PIN), &cancel).unwrap();

        let status = manager.status(READER, None, &cancel).unwrap();
        assert!(status.pin_set);
        assert!(!status.pin_verified);
        assert_eq!(status.item_count, None);
        assert_eq!(status.pin_tries_remaining, Some(MAX_PIN_TRIES));

        let status = manager.status(READER, Some(PIN), &cancel).unwrap();
        assert!(status.pin_verified);
        assert_eq!(status.item_count, Some(1));
    }

    #[test]
    fn test_lockout_stops_contacting_card() {
        let (backend, manager) = manager_with(SimulatedApplet::new().with_pin(PIN));

        for remaining in (0..MAX_PIN_TRIES).rev() {
            assert_eq!(
                manager.verify_pin(READER, "00000000"),
                Err(CardError::WrongPin { remaining })
            );
            assert_eq!(manager.pin_tries_remaining(READER), remaining);
        }

        let before = backend.with_card(READER, |c| c.commands_processed());
        assert_eq!(manager.verify_pin(READER, PIN), Err(CardError::PinLocked));
        assert_eq!(
            manager.read_items(READER, Some(PIN), &CancelToken::new()),
            Err(CardError::PinLocked)
        );
        assert_eq!(backend.with_card(READER, |c| c.commands_processed()), before);
    }

    #[test]
    fn test_tracker_resyncs_from_status() {
        let (backend, first) = manager_with(SimulatedApplet::new().with_pin(PIN));
        first.verify_pin(READER, "00000000").unwrap_err();
        first.verify_pin(READER, "00000000").unwrap_err();
        assert_eq!(first.pin_tries_remaining(READER), 3);

        // A fresh host learns the count from the card
        let second = CardManager::new(backend);
        assert_eq!(second.pin_tries_remaining(READER), MAX_PIN_TRIES);
        second.status(READER, None, &CancelToken::new()).unwrap();
        assert_eq!(second.pin_tries_remaining(READER), 3);

        second.verify_pin(READER, PIN).unwrap();
        assert_eq!(second.pin_tries_remaining(READER), MAX_PIN_TRIES);
    }

    #[test]
    fn test_chunk_boundaries() {
        // Payload sizes chosen so the encoded blob lands around chunk edges
        for size in [1usize, 240, 241, 480, ITEM_CAPACITY] {
            let (backend, manager) = manager_with(SimulatedApplet::new());
            let cancel = CancelToken::new();
            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            manager
                .write_item(READER, CardItem::new(ItemKind::Vault, "", payload.clone()), None, &cancel)
                .unwrap();

            let items = manager.read_items(READER, None, &cancel).unwrap();
            assert_eq!(items.len(), 1, "size {}", size);
            assert_eq!(items[0].payload, payload, "size {}", size);
            assert_eq!(
                backend.with_card(READER, |c| c.stored_data().len()),
                Some(LAYOUT_MAGIC.len() + 4 + size)
            );
        }
    }

    #[test]
    fn test_capacity_exceeded_leaves_items() {
        let (backend, manager) = manager_with(SimulatedApplet::new());
        let cancel = CancelToken::new();
        manager
            .write_keyfile(READER, &[1; ITEM_CAPACITY - 10], "big", None, &cancel)
            .unwrap();
        let before = backend.with_card(READER, |c| c.commands_processed()).unwrap();

        assert!(matches!(
            manager.write_keyfile(READER, &[2; 11], "small", None, &cancel),
            Err(CardError::CapacityExceeded(_))
        ));
        // SELECT, GET_STATUS and the reads only
        let after = backend.with_card(READER, |c| c.commands_processed()).unwrap();
        let reads = (LAYOUT_MAGIC.len() + 4 + 3 + ITEM_CAPACITY - 10).div_ceil(240);
        assert_eq!(after - before, 2 + reads);

        manager
            .write_keyfile(READER, &[2; 10], "small", None, &cancel)
            .unwrap();
        assert_eq!(manager.read_items(READER, None, &cancel).unwrap().len(), 2);
    }

    #[test]
    fn test_item_count_limit() {
        let (_, manager) = manager_with(SimulatedApplet::new());
        let cancel = CancelToken::new();
        for i in 0..MAX_ITEMS {
            manager
                .write_share(READER, "x", &i.to_string(), None, &cancel)
                .unwrap();
        }
        assert!(matches!(
            manager.write_share(READER, "x", "one too many", None, &cancel),
            Err(CardError::CapacityExceeded(_))
        ));
    }

    #[test]
    fn test_disconnect_mid_write_keeps_old_data() {
        let (backend, manager) = manager_with(SimulatedApplet::new());
        let cancel = CancelToken::new();
        manager.write_share(READER, "first", "a", None, &cancel).unwrap();
        let stored = backend
            .with_card(READER, |c| c.stored_data().to_vec())
            .unwrap();

        // SELECT, GET_STATUS, READ, SET_TYPE, SET_LABEL, then one STORE chunk
        backend.unplug_after(READER, 6);
        let big = "s".repeat(1000);
        assert!(matches!(
            manager.write_share(READER, &big, "b", None, &cancel),
            Err(CardError::Disconnected(_))
        ));
        assert_eq!(
            backend.with_card(READER, |c| c.stored_data().to_vec()),
            Some(stored)
        );

        backend.reinsert(READER);
        let items = manager.read_items(READER, None, &cancel).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].payload_str().unwrap(), "first");
    }

    #[test]
    fn test_cancelled_operation_sends_nothing() {
        let (backend, manager) = manager_with(SimulatedApplet::new());
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(
            manager.write_share(READER, "s", "", None, &cancel),
            Err(CardError::Cancelled)
        );
        assert_eq!(backend.with_card(READER, |c| c.commands_processed()), Some(0));

        // The reader is released afterwards
        assert!(manager.status(READER, None, &CancelToken::new()).is_ok());
    }

    #[test]
    fn test_legacy_card_reads_as_one_item() {
        let legacy = SimulatedApplet::new().with_raw_data(
            ItemKind::Share.to_byte(),
            "Old share",
            b"seQRets|salt|data",
        );
        let (_, manager) = manager_with(legacy);
        let cancel = CancelToken::new();

        let items = manager.read_items(READER, None, &cancel).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, ItemKind::Share);
        assert_eq!(items[0].label, "Old share");
        assert_eq!(items[0].payload_str().unwrap(), "seQRets|salt|data");

        // Appending converts the card to the item layout
        manager.write_share(READER, "new", "New", None, &cancel).unwrap();
        let items = manager.read_items(READER, None, &cancel).unwrap();
        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["Old share", "New"]);
    }

    #[test]
    fn test_clone_card() {
        let (backend, manager) = manager_with(SimulatedApplet::new().with_pin(PIN));
        let cancel = CancelToken::new();
        manager.write_share(READER, "one", "1", Some(PIN), &cancel).unwrap();
        manager
            .write_vault(READER, "{\"version\":1}", "vault", Some(PIN), &cancel)
            .unwrap();

        backend.insert_card(
            "dest",
            SimulatedApplet::new().with_raw_data(ItemKind::Keyfile.to_byte(), "stale", &[7; 8]),
        );
        let copied = manager
            .clone_card(READER, "dest", Some(PIN), Some("87654321"), &cancel)
            .unwrap();
        assert_eq!(copied, 2);

        // Destination contents are replaced and now PIN protected
        assert_eq!(
            manager.read_items("dest", None, &cancel),
            Err(CardError::PinRequired)
        );
        let items = manager.read_items("dest", Some("87654321"), &cancel).unwrap();
        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["1", "vault"]);
        assert_eq!(
            backend.with_card(READER, |c| c.stored_data().to_vec()),
            backend.with_card("dest", |c| c.stored_data().to_vec())
        );
    }

    #[test]
    fn test_clone_wrong_source_pin_leaves_destination() {
        let (backend, manager) = manager_with(SimulatedApplet::new().with_pin(PIN));
        let cancel = CancelToken::new();
        manager.write_share(READER, "one", "1", Some(PIN), &cancel).unwrap();
        backend.insert_card(
            "dest",
            SimulatedApplet::new().with_raw_data(ItemKind::Keyfile.to_byte(), "keep", &[7; 8]),
        );

        assert_eq!(
            manager.clone_card(READER, "dest", Some("00000000"), None, &cancel),
            Err(CardError::WrongPin { remaining: 4 })
        );
        assert_eq!(
            backend.with_card("dest", |c| c.stored_data().to_vec()),
            Some(vec![7; 8])
        );
    }

    #[test]
    fn test_set_and_change_pin() {
        let (_, manager) = manager_with(SimulatedApplet::new());
        let cancel = CancelToken::new();

        assert!(matches!(
            manager.set_pin(READER, "1234"),
            Err(CardError::InvalidPin(_))
        ));
        assert!(matches!(
            manager.verify_pin(READER, PIN),
            Err(CardError::InvalidPin(_))
        ));

        manager.set_pin(READER, PIN).unwrap();
        assert!(matches!(
            manager.set_pin(READER, "87654321"),
            Err(CardError::InvalidPin(_))
        ));

        assert_eq!(
            manager.change_pin(READER, "99999999", "87654321"),
            Err(CardError::WrongPin { remaining: 4 })
        );
        manager.change_pin(READER, PIN, "87654321").unwrap();
        manager.verify_pin(READER, "87654321").unwrap();

        manager
            .write_share(READER, "s", "", Some("87654321"), &cancel)
            .unwrap();
    }

    #[test]
    fn test_busy_reader() {
        let (_, manager) = manager_with(SimulatedApplet::new());
        let lease = manager.lease(READER).unwrap();
        assert_eq!(
            manager.status(READER, None, &CancelToken::new()),
            Err(CardError::Busy(READER.into()))
        );
        drop(lease);
        assert!(manager.status(READER, None, &CancelToken::new()).is_ok());
    }

    #[test]
    fn test_unknown_reader() {
        let (_, manager) = manager_with(SimulatedApplet::new());
        assert!(matches!(
            manager.read_items("nope", None, &CancelToken::new()),
            Err(CardError::ReaderNotFound(_))
        ));
    }

    #[test]
    fn test_clone_rejects_same_reader() {
        let (_, manager) = manager_with(SimulatedApplet::new());
        assert_eq!(
            manager.clone_card(READER, READER, None, None, &CancelToken::new()),
            Err(CardError::SameReader)
        );
    }

    #[test]
    fn test_clone_empty_source() {
        let (backend, manager) = manager_with(SimulatedApplet::new());
        backend.insert_card("dest", SimulatedApplet::new());
        assert_eq!(
            manager.clone_card(READER, "dest", None, None, &CancelToken::new()),
            Err(CardError::NoData)
        );
    }
}
