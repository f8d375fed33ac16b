use thiserror::Error;

use crate::apdu::StatusWord;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CardError {
    #[error("Smart card reader not found: {0}")]
    ReaderNotFound(String),
    #[error("Cannot access smart card system: {0}")]
    Unavailable(String),
    #[error("Reader {0} is busy with another operation")]
    Busy(String),
    #[error("Card disconnected during operation: {0}")]
    Disconnected(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("seQRets applet not found on this card")]
    AppletNotFound,
    #[error("PIN verification required")]
    PinRequired,
    #[error("Incorrect PIN, {remaining} attempts remaining")]
    WrongPin { remaining: u8 },
    #[error("Card is locked after too many incorrect PIN attempts")]
    PinLocked,
    #[error("Invalid PIN: {0}")]
    InvalidPin(String),
    #[error("Card capacity exceeded: {0}")]
    CapacityExceeded(String),
    #[error("No data stored on this card")]
    NoData,
    #[error("No item {0} on this card")]
    ItemNotFound(usize),
    #[error("Source and destination must be different readers")]
    SameReader,
    #[error("Invalid card data: {0}")]
    Format(String),
    #[error("Card protocol error: {0}")]
    Protocol(String),
}

impl CardError {
    /// Map a non-success status word to an error.
    pub fn from_status(sw: StatusWord) -> Self {
        match sw {
            StatusWord::PIN_REQUIRED => CardError::PinRequired,
            StatusWord::PIN_LOCKED => CardError::PinLocked,
            StatusWord::STORAGE_FULL => {
                CardError::CapacityExceeded("card storage is full".into())
            }
            StatusWord::APPLET_NOT_FOUND => CardError::AppletNotFound,
            sw => match sw.pin_tries_remaining() {
                Some(remaining) => CardError::WrongPin { remaining },
                None => CardError::Protocol(format!("card returned SW={}", sw)),
            },
        }
    }
}
