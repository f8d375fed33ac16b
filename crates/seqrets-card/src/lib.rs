//! Smart card storage for seQRets
//!
//! Shares, encrypted vaults, keyfiles and encrypted instructions are kept
//! on a JavaCard running the seQRets applet. A card holds several items,
//! written as one blob behind a `SQC1` header; cards written by the older
//! single-item flow are read as one item.
//!
//! - [`apdu`]: command and response framing, status words
//! - [`backend`]: reader backends and cancellation
//! - [`layout`]: the multi-item blob
//! - [`manager`]: the operations applications call
//! - [`sim`]: an in-memory applet for tests and demos
//!
//! Real readers are available through PC/SC with the `pcsc` feature.

pub mod apdu;
pub mod backend;
pub mod error;
pub mod layout;
pub mod manager;
pub mod pin;
pub mod sim;

mod session;

#[cfg(feature = "pcsc")]
pub mod pcsc;

pub use backend::{CancelToken, CardBackend, CardChannel};
pub use error::CardError;
pub use layout::{CardItem, ItemKind, ITEM_CAPACITY, MAX_ITEMS, MAX_LABEL_LEN};
pub use manager::{CardManager, CardStatus};
pub use pin::{validate_new_pin, MAX_PIN_LEN, MAX_PIN_TRIES, MIN_PIN_LEN};
pub use sim::{SimulatedApplet, SimulatedBackend};

#[cfg(feature = "pcsc")]
pub use crate::pcsc::PcscBackend;
