//! One connection to the applet: SELECT, then a sequence of commands.
//!
//! Every APDU first checks the cancel token. Transfers larger than
//! [`CHUNK_SIZE`] go out as numbered STORE_DATA chunks that the applet
//! stages and commits on the last one.

use zeroize::Zeroizing;

use crate::apdu::{
    Command, Response, CHUNK_SIZE, INS_CHANGE_PIN, INS_ERASE_DATA, INS_GET_STATUS,
    INS_READ_DATA, INS_SET_LABEL, INS_SET_PIN, INS_SET_TYPE, INS_STORE_DATA, INS_VERIFY_PIN,
    P2_LAST_CHUNK, SEQRETS_AID,
};
use crate::backend::{CancelToken, CardBackend, CardChannel};
use crate::error::CardError;
use crate::layout::truncate_label;

/// Chunk indices travel in P1
const MAX_CHUNKS: usize = u8::MAX as usize + 1;

/// Decoded GET_STATUS response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawStatus {
    pub data_length: u16,
    pub data_type: u8,
    pub pin_set: bool,
    pub pin_verified: bool,
    pub label: String,
    /// Absent on applets that predate the tries byte
    pub tries_remaining: Option<u8>,
}

impl RawStatus {
    /// `len:u16 ‖ type ‖ pin_set ‖ pin_verified ‖ label_len ‖ label ‖ tries_remaining`
    pub fn parse(resp: &[u8]) -> Result<Self, CardError> {
        let [len_hi, len_lo, data_type, pin_set, pin_verified, label_len, rest @ ..] = resp else {
            return Err(CardError::Protocol("invalid status response".into()));
        };
        let label_len = *label_len as usize;
        if rest.len() < label_len {
            return Err(CardError::Protocol("status label truncated".into()));
        }
        let (label, tail) = rest.split_at(label_len);

        Ok(Self {
            data_length: u16::from_be_bytes([*len_hi, *len_lo]),
            data_type: *data_type,
            pin_set: *pin_set == 0x01,
            pin_verified: *pin_verified == 0x01,
            label: String::from_utf8_lossy(label).into_owned(),
            tries_remaining: tail.first().copied(),
        })
    }
}

pub(crate) struct Session<'b> {
    channel: Box<dyn CardChannel + 'b>,
    reader: String,
    cancel: CancelToken,
}

impl<'b> Session<'b> {
    /// Connect and select the seQRets applet.
    pub fn open(
        backend: &'b dyn CardBackend,
        reader: &str,
        cancel: &CancelToken,
    ) -> Result<Self, CardError> {
        cancel.check()?;
        let channel = backend.connect(reader)?;
        let mut session = Self {
            channel,
            reader: reader.to_owned(),
            cancel: cancel.clone(),
        };
        session.exchange(&Command::select(&SEQRETS_AID)?)?;
        log::debug!("selected seQRets applet in {}", reader);
        Ok(session)
    }

    fn exchange(&mut self, cmd: &Command) -> Result<Vec<u8>, CardError> {
        self.cancel.check()?;
        log::trace!(
            "{}: INS {:02X} P1 {:02X} P2 {:02X} Lc {}",
            self.reader,
            cmd.ins,
            cmd.p1,
            cmd.p2,
            cmd.data.len()
        );
        let raw = Zeroizing::new(cmd.to_bytes());
        let resp = self.channel.transmit(&raw)?;
        Response::parse(&resp)?.into_result()
    }

    fn send(&mut self, ins: u8, p1: u8, p2: u8, data: &[u8]) -> Result<Vec<u8>, CardError> {
        self.exchange(&Command::new(ins, p1, p2, data)?)
    }

    pub fn status(&mut self) -> Result<RawStatus, CardError> {
        let resp = self.send(INS_GET_STATUS, 0x00, 0x00, &[])?;
        RawStatus::parse(&resp)
    }

    pub fn verify_pin(&mut self, pin: &str) -> Result<(), CardError> {
        self.send(INS_VERIFY_PIN, 0x00, 0x00, pin.as_bytes())?;
        Ok(())
    }

    pub fn set_pin(&mut self, pin: &str) -> Result<(), CardError> {
        self.send(INS_SET_PIN, 0x00, 0x00, pin.as_bytes())?;
        Ok(())
    }

    /// CHANGE_PIN: P1 = old PIN length, data = old ‖ new
    pub fn change_pin(&mut self, old_pin: &str, new_pin: &str) -> Result<(), CardError> {
        let old = old_pin.as_bytes();
        let old_len = u8::try_from(old.len())
            .map_err(|_| CardError::InvalidPin("current PIN is too long".into()))?;
        let mut data = Zeroizing::new(Vec::with_capacity(old.len() + new_pin.len()));
        data.extend_from_slice(old);
        data.extend_from_slice(new_pin.as_bytes());
        self.send(INS_CHANGE_PIN, old_len, 0x00, &data)?;
        Ok(())
    }

    pub fn erase(&mut self) -> Result<(), CardError> {
        self.send(INS_ERASE_DATA, 0x00, 0x00, &[])?;
        log::info!("erased card in {}", self.reader);
        Ok(())
    }

    /// Read `len` bytes chunk by chunk.
    pub fn read_blob(&mut self, len: usize) -> Result<Zeroizing<Vec<u8>>, CardError> {
        let mut out = Zeroizing::new(Vec::with_capacity(len));
        let chunks = len.div_ceil(CHUNK_SIZE);
        if chunks > MAX_CHUNKS {
            return Err(CardError::Protocol(format!("{} bytes exceed the chunk range", len)));
        }

        for index in 0..chunks {
            let chunk = self.send(INS_READ_DATA, index as u8, 0x00, &[])?;
            if chunk.is_empty() {
                break;
            }
            out.extend_from_slice(&chunk);
            if out.len() >= len {
                break;
            }
        }

        if out.len() < len {
            return Err(CardError::Protocol(format!(
                "card returned {} of {} bytes",
                out.len(),
                len
            )));
        }
        out.truncate(len);
        log::debug!("read {} bytes from {}", len, self.reader);
        Ok(out)
    }

    /// Stage type and label, then send the blob; the last chunk commits.
    ///
    /// No ERASE is sent first. Overwriting relies on the applet staging the
    /// type, label and data together and swapping them in on the last chunk,
    /// so the previous contents stay readable until then. An applet that
    /// applies SET_TYPE or SET_LABEL immediately needs [`Session::erase`]
    /// before this call. An empty label is not sent.
    pub fn write_blob(&mut self, blob: &[u8], data_type: u8, label: &str) -> Result<(), CardError> {
        if blob.is_empty() {
            return Err(CardError::Format("nothing to write".into()));
        }
        let chunks = blob.len().div_ceil(CHUNK_SIZE);
        if chunks > MAX_CHUNKS {
            return Err(CardError::CapacityExceeded(format!(
                "{} bytes exceed the chunk range",
                blob.len()
            )));
        }

        self.send(INS_SET_TYPE, data_type, 0x00, &[])?;
        if !label.is_empty() {
            self.send(INS_SET_LABEL, 0x00, 0x00, truncate_label(label).as_bytes())?;
        }

        for (index, chunk) in blob.chunks(CHUNK_SIZE).enumerate() {
            let p2 = if index + 1 == chunks { P2_LAST_CHUNK } else { 0x00 };
            self.send(INS_STORE_DATA, index as u8, p2, chunk)?;
        }
        log::debug!(
            "wrote {} bytes to {} in {} chunks",
            blob.len(),
            self.reader,
            chunks
        );
        Ok(())
    }
}
