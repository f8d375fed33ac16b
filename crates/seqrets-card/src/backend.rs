//! Reader backends
//!
//! A backend enumerates readers and opens a channel to the card in one of
//! them. Backends are picked at runtime: [`crate::sim::SimulatedBackend`]
//! always, `crate::pcsc::PcscBackend` with the `pcsc` feature.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::CardError;

/// Source of readers and card connections.
pub trait CardBackend: Send + Sync {
    fn list_readers(&self) -> Result<Vec<String>, CardError>;

    /// Connect to the card in `reader`.
    ///
    /// Fails with [`CardError::ReaderNotFound`] for an unknown reader and
    /// [`CardError::Disconnected`] when the reader is empty.
    fn connect(&self, reader: &str) -> Result<Box<dyn CardChannel + '_>, CardError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// An open connection to one card.
pub trait CardChannel {
    /// Send a raw command APDU and return the raw response (data ‖ SW1 SW2).
    ///
    /// Any transport failure is [`CardError::Disconnected`].
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, CardError>;
}

/// Cooperative cancellation, checked before every APDU.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<(), CardError> {
        if self.is_cancelled() {
            Err(CardError::Cancelled)
        } else {
            Ok(())
        }
    }
}
