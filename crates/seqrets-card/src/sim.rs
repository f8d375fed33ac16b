//! In-memory card backend
//!
//! [`SimulatedApplet`] answers the same APDU set as the JavaCard applet,
//! including staged writes, PIN tries and status words.
//! [`SimulatedBackend`] puts applets into named readers and can pull a
//! card out after a given number of commands, to exercise the
//! disconnect paths.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use zeroize::Zeroizing;

use crate::apdu::{
    Command, StatusWord, CHUNK_SIZE, CLA, CLA_ISO, INS_CHANGE_PIN, INS_ERASE_DATA,
    INS_GET_STATUS, INS_READ_DATA, INS_SELECT, INS_SET_LABEL, INS_SET_PIN, INS_SET_TYPE,
    INS_STORE_DATA, INS_VERIFY_PIN, P2_LAST_CHUNK, SEQRETS_AID,
};
use crate::backend::{CardBackend, CardChannel};
use crate::error::CardError;
use crate::layout::{MAX_BLOB_LEN, MAX_LABEL_LEN};
use crate::pin::{MAX_PIN_LEN, MAX_PIN_TRIES, MIN_PIN_LEN};

/// Bytes of applet storage: room for a full item layout
pub const DEFAULT_APPLET_CAPACITY: usize = MAX_BLOB_LEN;

const CLA_NOT_SUPPORTED: StatusWord = StatusWord(0x6E00);

#[derive(Default)]
struct Staging {
    data: Vec<u8>,
    next_chunk: u8,
    data_type: u8,
    label: Vec<u8>,
}

/// The seQRets applet, in memory.
pub struct SimulatedApplet {
    installed: bool,
    capacity: usize,
    data: Vec<u8>,
    data_type: u8,
    label: Vec<u8>,
    pin: Option<Zeroizing<Vec<u8>>>,
    tries_remaining: u8,
    selected: bool,
    pin_verified: bool,
    staging: Staging,
    commands: usize,
}

impl Default for SimulatedApplet {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedApplet {
    /// A blank card with the applet installed.
    pub fn new() -> Self {
        Self {
            installed: true,
            capacity: DEFAULT_APPLET_CAPACITY,
            data: Vec::new(),
            data_type: 0,
            label: Vec::new(),
            pin: None,
            tries_remaining: MAX_PIN_TRIES,
            selected: false,
            pin_verified: false,
            staging: Staging::default(),
            commands: 0,
        }
    }

    /// A card without the seQRets applet.
    pub fn without_applet() -> Self {
        Self {
            installed: false,
            ..Self::new()
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_pin(mut self, pin: &str) -> Self {
        self.pin = Some(Zeroizing::new(pin.as_bytes().to_vec()));
        self
    }

    /// Raw data as the single-item flow wrote it.
    pub fn with_raw_data(mut self, data_type: u8, label: &str, data: &[u8]) -> Self {
        self.data_type = data_type;
        self.label = label.as_bytes().to_vec();
        self.data = data.to_vec();
        self
    }

    pub fn stored_data(&self) -> &[u8] {
        &self.data
    }

    pub fn pin_tries_remaining(&self) -> u8 {
        self.tries_remaining
    }

    /// APDUs processed since creation
    pub fn commands_processed(&self) -> usize {
        self.commands
    }

    /// Card removed and reinserted: transient state is lost.
    pub fn power_cycle(&mut self) {
        self.selected = false;
        self.pin_verified = false;
        self.staging = Staging::default();
    }

    /// Process one command APDU and return `data ‖ SW1 SW2`.
    pub fn process(&mut self, raw: &[u8]) -> Vec<u8> {
        self.commands += 1;
        let (mut data, sw) = match Command::parse(raw) {
            Ok(cmd) => self.dispatch(&cmd),
            Err(sw) => (Vec::new(), sw),
        };
        data.extend_from_slice(&sw.to_bytes());
        data
    }

    fn dispatch(&mut self, cmd: &Command) -> (Vec<u8>, StatusWord) {
        if cmd.cla == CLA_ISO && cmd.ins == INS_SELECT {
            return (Vec::new(), self.select(&cmd.data));
        }
        if !self.selected {
            return (Vec::new(), StatusWord::CONDITIONS_NOT_SATISFIED);
        }
        if cmd.cla != CLA {
            return (Vec::new(), CLA_NOT_SUPPORTED);
        }

        match cmd.ins {
            INS_GET_STATUS => (self.status(), StatusWord::OK),
            INS_READ_DATA => self.read(cmd.p1),
            INS_VERIFY_PIN => (Vec::new(), self.verify(&cmd.data)),
            INS_SET_PIN => (Vec::new(), self.set_pin(&cmd.data)),
            INS_CHANGE_PIN => (Vec::new(), self.change_pin(cmd.p1, &cmd.data)),
            INS_STORE_DATA | INS_ERASE_DATA | INS_SET_TYPE | INS_SET_LABEL => {
                (Vec::new(), self.write(cmd))
            }
            _ => (Vec::new(), StatusWord::INS_NOT_SUPPORTED),
        }
    }

    fn select(&mut self, aid: &[u8]) -> StatusWord {
        if !self.installed || aid != SEQRETS_AID {
            self.selected = false;
            return StatusWord::APPLET_NOT_FOUND;
        }
        self.selected = true;
        self.pin_verified = false;
        self.staging = Staging::default();
        StatusWord::OK
    }

    fn locked(&self) -> bool {
        self.pin.is_some() && self.tries_remaining == 0
    }

    fn access(&self) -> Result<(), StatusWord> {
        match &self.pin {
            None => Ok(()),
            Some(_) if self.locked() => Err(StatusWord::PIN_LOCKED),
            Some(_) if self.pin_verified => Ok(()),
            Some(_) => Err(StatusWord::PIN_REQUIRED),
        }
    }

    fn status(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(7 + self.label.len());
        out.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        out.push(self.data_type);
        out.push(self.pin.is_some() as u8);
        out.push(self.pin_verified as u8);
        out.push(self.label.len() as u8);
        out.extend_from_slice(&self.label);
        out.push(self.tries_remaining);
        out
    }

    fn read(&self, chunk: u8) -> (Vec<u8>, StatusWord) {
        if let Err(sw) = self.access() {
            return (Vec::new(), sw);
        }
        let offset = chunk as usize * CHUNK_SIZE;
        if self.data.is_empty() {
            return (Vec::new(), StatusWord::OK);
        }
        if offset >= self.data.len() {
            return (Vec::new(), StatusWord::BAD_CHUNK);
        }
        let end = (offset + CHUNK_SIZE).min(self.data.len());
        (self.data[offset..end].to_vec(), StatusWord::OK)
    }

    fn write(&mut self, cmd: &Command) -> StatusWord {
        if let Err(sw) = self.access() {
            return sw;
        }
        match cmd.ins {
            INS_ERASE_DATA => {
                self.data.clear();
                self.data_type = 0;
                self.label.clear();
                self.staging = Staging::default();
                StatusWord::OK
            }
            INS_SET_TYPE => {
                self.staging.data_type = cmd.p1;
                StatusWord::OK
            }
            INS_SET_LABEL => {
                if cmd.data.len() > MAX_LABEL_LEN {
                    return StatusWord::WRONG_LENGTH;
                }
                self.staging.label = cmd.data.clone();
                StatusWord::OK
            }
            _ => self.store(cmd.p1, cmd.p2, &cmd.data),
        }
    }

    fn store(&mut self, chunk: u8, p2: u8, bytes: &[u8]) -> StatusWord {
        if bytes.is_empty() || bytes.len() > CHUNK_SIZE {
            return StatusWord::WRONG_LENGTH;
        }
        if chunk == 0 {
            self.staging.data.clear();
            self.staging.next_chunk = 0;
        }
        if chunk != self.staging.next_chunk {
            self.staging.data.clear();
            self.staging.next_chunk = 0;
            return StatusWord::BAD_CHUNK;
        }
        if self.staging.data.len() + bytes.len() > self.capacity {
            self.staging = Staging::default();
            return StatusWord::STORAGE_FULL;
        }

        self.staging.data.extend_from_slice(bytes);
        self.staging.next_chunk = self.staging.next_chunk.wrapping_add(1);

        if p2 == P2_LAST_CHUNK {
            let staged = std::mem::take(&mut self.staging);
            self.data = staged.data;
            self.data_type = staged.data_type;
            self.label = staged.label;
        }
        StatusWord::OK
    }

    fn check_pin(&mut self, candidate: &[u8]) -> StatusWord {
        let Some(pin) = &self.pin else {
            return StatusWord::CONDITIONS_NOT_SATISFIED;
        };
        if self.tries_remaining == 0 {
            return StatusWord::PIN_LOCKED;
        }
        if pin.as_slice() == candidate {
            self.tries_remaining = MAX_PIN_TRIES;
            self.pin_verified = true;
            StatusWord::OK
        } else {
            self.tries_remaining -= 1;
            self.pin_verified = false;
            StatusWord::wrong_pin(self.tries_remaining)
        }
    }

    fn verify(&mut self, candidate: &[u8]) -> StatusWord {
        self.check_pin(candidate)
    }

    fn set_pin(&mut self, new_pin: &[u8]) -> StatusWord {
        if self.pin.is_some() {
            return StatusWord::CONDITIONS_NOT_SATISFIED;
        }
        if !(MIN_PIN_LEN..=MAX_PIN_LEN).contains(&new_pin.len()) {
            return StatusWord::WRONG_LENGTH;
        }
        self.pin = Some(Zeroizing::new(new_pin.to_vec()));
        self.tries_remaining = MAX_PIN_TRIES;
        self.pin_verified = true;
        StatusWord::OK
    }

    fn change_pin(&mut self, old_len: u8, data: &[u8]) -> StatusWord {
        let old_len = old_len as usize;
        if old_len > data.len() {
            return StatusWord::WRONG_LENGTH;
        }
        let (old, new) = data.split_at(old_len);
        if !(MIN_PIN_LEN..=MAX_PIN_LEN).contains(&new.len()) {
            return StatusWord::WRONG_LENGTH;
        }
        let sw = self.check_pin(old);
        if sw != StatusWord::OK {
            return sw;
        }
        self.pin = Some(Zeroizing::new(new.to_vec()));
        StatusWord::OK
    }
}

struct Slot {
    card: Option<SimulatedApplet>,
    unplugged: bool,
    unplug_after: Option<usize>,
}

/// Named readers holding simulated cards. Clones share the same readers.
#[derive(Clone, Default)]
pub struct SimulatedBackend {
    readers: Arc<Mutex<BTreeMap<String, Slot>>>,
    latency: Option<Duration>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long per APDU, to make transfers observable from other threads.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn slots(&self) -> MutexGuard<'_, BTreeMap<String, Slot>> {
        self.readers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an empty reader.
    pub fn add_reader(&self, name: &str) {
        self.slots().entry(name.to_owned()).or_insert(Slot {
            card: None,
            unplugged: false,
            unplug_after: None,
        });
    }

    /// Put a card into a reader, adding the reader if needed.
    pub fn insert_card(&self, reader: &str, card: SimulatedApplet) {
        self.add_reader(reader);
        if let Some(slot) = self.slots().get_mut(reader) {
            slot.card = Some(card);
            slot.unplugged = false;
            slot.unplug_after = None;
        }
    }

    pub fn remove_card(&self, reader: &str) -> Option<SimulatedApplet> {
        self.slots().get_mut(reader).and_then(|slot| slot.card.take())
    }

    /// Pull the card after `commands` more APDUs have been answered.
    pub fn unplug_after(&self, reader: &str, commands: usize) {
        if let Some(slot) = self.slots().get_mut(reader) {
            slot.unplug_after = Some(commands);
        }
    }

    /// Put an unplugged card back.
    pub fn reinsert(&self, reader: &str) {
        if let Some(slot) = self.slots().get_mut(reader) {
            slot.unplugged = false;
            slot.unplug_after = None;
            if let Some(card) = slot.card.as_mut() {
                card.power_cycle();
            }
        }
    }

    /// Inspect the card in a reader.
    pub fn with_card<R>(&self, reader: &str, f: impl FnOnce(&SimulatedApplet) -> R) -> Option<R> {
        self.slots()
            .get(reader)
            .and_then(|slot| slot.card.as_ref())
            .map(f)
    }
}

impl CardBackend for SimulatedBackend {
    fn list_readers(&self) -> Result<Vec<String>, CardError> {
        Ok(self.slots().keys().cloned().collect())
    }

    fn connect(&self, reader: &str) -> Result<Box<dyn CardChannel + '_>, CardError> {
        let mut slots = self.slots();
        let slot = slots
            .get_mut(reader)
            .ok_or_else(|| CardError::ReaderNotFound(reader.to_owned()))?;
        match slot.card.as_mut() {
            Some(card) if !slot.unplugged => {
                card.power_cycle();
                Ok(Box::new(SimulatedChannel {
                    backend: self,
                    reader: reader.to_owned(),
                }))
            }
            _ => Err(CardError::Disconnected(format!("no card in {}", reader))),
        }
    }

    fn name(&self) -> &'static str {
        "simulator"
    }
}

struct SimulatedChannel<'a> {
    backend: &'a SimulatedBackend,
    reader: String,
}

impl CardChannel for SimulatedChannel<'_> {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, CardError> {
        if let Some(latency) = self.backend.latency {
            std::thread::sleep(latency);
        }

        let mut slots = self.backend.slots();
        let removed = || CardError::Disconnected(format!("card removed from {}", self.reader));
        let slot = slots.get_mut(&self.reader).ok_or_else(removed)?;

        if slot.unplugged {
            return Err(removed());
        }
        if let Some(left) = slot.unplug_after.as_mut() {
            if *left == 0 {
                slot.unplugged = true;
                slot.unplug_after = None;
                return Err(removed());
            }
            *left -= 1;
        }

        let card = slot.card.as_mut().ok_or_else(removed)?;
        Ok(card.process(apdu))
    }
}
