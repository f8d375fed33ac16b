//! APDU codec for the seQRets applet
//!
//! Short APDUs only: `CLA INS P1 P2 [Lc data]`, responses `data SW1 SW2`.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CardError;

/// seQRets applet AID
pub const SEQRETS_AID: [u8; 9] = [0xF0, 0x53, 0x51, 0x52, 0x54, 0x53, 0x01, 0x00, 0x00];

/// Proprietary class byte
pub const CLA: u8 = 0x80;

/// ISO 7816-4 SELECT
pub const CLA_ISO: u8 = 0x00;
pub const INS_SELECT: u8 = 0xA4;

pub const INS_STORE_DATA: u8 = 0x01;
pub const INS_READ_DATA: u8 = 0x02;
pub const INS_GET_STATUS: u8 = 0x03;
pub const INS_ERASE_DATA: u8 = 0x04;
pub const INS_SET_TYPE: u8 = 0x10;
pub const INS_SET_LABEL: u8 = 0x11;
pub const INS_VERIFY_PIN: u8 = 0x20;
pub const INS_CHANGE_PIN: u8 = 0x21;
pub const INS_SET_PIN: u8 = 0x22;

/// Maximum bytes per command data field
pub const CHUNK_SIZE: usize = 240;

/// P2 of the final STORE_DATA chunk
pub const P2_LAST_CHUNK: u8 = 0x01;

/// Two-byte status word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord(pub u16);

impl StatusWord {
    pub const OK: StatusWord = StatusWord(0x9000);
    pub const WRONG_LENGTH: StatusWord = StatusWord(0x6700);
    pub const PIN_REQUIRED: StatusWord = StatusWord(0x6982);
    pub const PIN_LOCKED: StatusWord = StatusWord(0x6984);
    pub const CONDITIONS_NOT_SATISFIED: StatusWord = StatusWord(0x6985);
    pub const APPLET_NOT_FOUND: StatusWord = StatusWord(0x6A82);
    pub const STORAGE_FULL: StatusWord = StatusWord(0x6A84);
    pub const BAD_CHUNK: StatusWord = StatusWord(0x6A86);
    pub const INS_NOT_SUPPORTED: StatusWord = StatusWord(0x6D00);

    /// `63Cx`: wrong PIN with x tries left.
    pub fn wrong_pin(remaining: u8) -> Self {
        StatusWord(0x63C0 | (remaining & 0x0F) as u16)
    }

    pub fn pin_tries_remaining(self) -> Option<u8> {
        (self.0 & 0xFFF0 == 0x63C0).then_some((self.0 & 0x000F) as u8)
    }

    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// A command APDU. The data field is wiped on drop since it may hold a PIN.
#[derive(Debug, Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Command {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
}

impl Command {
    pub fn new(ins: u8, p1: u8, p2: u8, data: &[u8]) -> Result<Self, CardError> {
        if data.len() > u8::MAX as usize {
            return Err(CardError::Protocol(format!(
                "command data of {} bytes does not fit a short APDU",
                data.len()
            )));
        }
        Ok(Self {
            cla: CLA,
            ins,
            p1,
            p2,
            data: data.to_vec(),
        })
    }

    /// `SELECT` by DF name
    pub fn select(aid: &[u8]) -> Result<Self, CardError> {
        let mut cmd = Self::new(INS_SELECT, 0x04, 0x00, aid)?;
        cmd.cla = CLA_ISO;
        Ok(cmd)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.data.len());
        out.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);
        if !self.data.is_empty() {
            out.push(self.data.len() as u8);
            out.extend_from_slice(&self.data);
        }
        out
    }

    /// Parse a short command APDU (case 1 or case 3).
    pub fn parse(raw: &[u8]) -> Result<Self, StatusWord> {
        match raw {
            [cla, ins, p1, p2] => Ok(Self {
                cla: *cla,
                ins: *ins,
                p1: *p1,
                p2: *p2,
                data: Vec::new(),
            }),
            [cla, ins, p1, p2, lc, data @ ..] if *lc as usize == data.len() => Ok(Self {
                cla: *cla,
                ins: *ins,
                p1: *p1,
                p2: *p2,
                data: data.to_vec(),
            }),
            _ => Err(StatusWord::WRONG_LENGTH),
        }
    }
}

/// A response APDU split into data and status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub data: Vec<u8>,
    pub sw: StatusWord,
}

impl Response {
    pub fn parse(raw: &[u8]) -> Result<Self, CardError> {
        let Some(split) = raw.len().checked_sub(2) else {
            return Err(CardError::Protocol("response too short".into()));
        };
        let (data, sw) = raw.split_at(split);
        Ok(Self {
            data: data.to_vec(),
            sw: StatusWord(u16::from_be_bytes([sw[0], sw[1]])),
        })
    }

    /// Data on `9000`, the mapped error otherwise.
    pub fn into_result(self) -> Result<Vec<u8>, CardError> {
        if self.sw == StatusWord::OK {
            Ok(self.data)
        } else {
            Err(CardError::from_status(self.sw))
        }
    }
}
