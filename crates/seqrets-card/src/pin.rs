//! PIN policy
//!
//! The applet counts wrong PINs itself. The host keeps its own count per
//! reader as well, synced from every status response, so that a locked
//! card is refused without sending it another VERIFY.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::error::CardError;

pub const MIN_PIN_LEN: usize = 8;
pub const MAX_PIN_LEN: usize = 16;

/// Consecutive failures before the card locks
pub const MAX_PIN_TRIES: u8 = 5;

/// A new PIN must be 8-16 ASCII digits.
pub fn validate_new_pin(pin: &str) -> Result<(), CardError> {
    if !(MIN_PIN_LEN..=MAX_PIN_LEN).contains(&pin.len()) {
        return Err(CardError::InvalidPin(format!(
            "PIN must be {}-{} digits",
            MIN_PIN_LEN, MAX_PIN_LEN
        )));
    }
    if !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CardError::InvalidPin("PIN must contain only digits".into()));
    }
    Ok(())
}

/// Host-side consecutive failure counts, keyed by reader name.
#[derive(Debug, Default)]
pub(crate) struct PinTracker {
    failures: Mutex<HashMap<String, u8>>,
}

impl PinTracker {
    fn with_failures<R>(&self, f: impl FnOnce(&mut HashMap<String, u8>) -> R) -> R {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut failures)
    }

    pub fn remaining(&self, reader: &str) -> u8 {
        let failed = self.with_failures(|f| f.get(reader).copied().unwrap_or(0));
        MAX_PIN_TRIES.saturating_sub(failed)
    }

    /// Refuse before contacting the card once the count is exhausted.
    pub fn check(&self, reader: &str) -> Result<(), CardError> {
        if self.remaining(reader) == 0 {
            log::warn!("refusing PIN verification on locked card in {}", reader);
            return Err(CardError::PinLocked);
        }
        Ok(())
    }

    /// Adopt the card's own count.
    pub fn sync(&self, reader: &str, tries_remaining: u8) {
        let failed = MAX_PIN_TRIES.saturating_sub(tries_remaining);
        self.with_failures(|f| {
            if failed == 0 {
                f.remove(reader);
            } else {
                f.insert(reader.to_owned(), failed);
            }
        });
    }

    /// Fold the outcome of one VERIFY (or CHANGE_PIN) into the count.
    pub fn record(&self, reader: &str, outcome: &Result<(), CardError>) {
        match outcome {
            Ok(()) => self.sync(reader, MAX_PIN_TRIES),
            Err(CardError::WrongPin { remaining }) => {
                log::warn!(
                    "wrong PIN for card in {}, {} attempts remaining",
                    reader,
                    remaining
                );
                self.sync(reader, *remaining);
            }
            Err(CardError::PinLocked) => self.sync(reader, 0),
            Err(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_new_pin() {
        assert!(validate_new_pin("12345678").is_ok());
        assert!(validate_new_pin("1234567890123456").is_ok());

        for bad in ["1234567", "12345678901234567", "1234abcd", "1234 5678", ""] {
            assert!(
                matches!(validate_new_pin(bad), Err(CardError::InvalidPin(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_tracker_counts_down_to_lock() {
        let tracker = PinTracker::default();
        assert_eq!(tracker.remaining("r"), MAX_PIN_TRIES);

        for remaining in (0..MAX_PIN_TRIES).rev() {
            assert!(tracker.check("r").is_ok());
            tracker.record("r", &Err(CardError::WrongPin { remaining }));
            assert_eq!(tracker.remaining("r"), remaining);
        }
        assert_eq!(tracker.check("r"), Err(CardError::PinLocked));

        // Other readers are unaffected
        assert!(tracker.check("other").is_ok());
    }

    #[test]
    fn test_tracker_success_and_sync() {
        let tracker = PinTracker::default();
        tracker.record("r", &Err(CardError::WrongPin { remaining: 2 }));
        assert_eq!(tracker.remaining("r"), 2);

        tracker.record("r", &Ok(()));
        assert_eq!(tracker.remaining("r"), MAX_PIN_TRIES);

        tracker.sync("r", 0);
        assert_eq!(tracker.check("r"), Err(CardError::PinLocked));

        // Unrelated failures leave the count alone
        tracker.sync("r", 3);
        tracker.record("r", &Err(CardError::Disconnected("gone".into())));
        assert_eq!(tracker.remaining("r"), 3);
    }
}
