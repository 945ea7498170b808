use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicBool, Ordering};

use domain::SlaveAddress;

/// The address currently believed to answer on the bus, plus the
/// "reconfigured, power cycle pending" flag.
///
/// Outlives individual sessions so a reconnect can verify the address a
/// previous session configured.
#[derive(Debug, Default)]
pub struct AddressBook {
    current: Mutex<Option<SlaveAddress>>,
    restart_missing: AtomicBool,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<SlaveAddress> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_current(&self, address: Option<SlaveAddress>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = address;
    }

    pub fn restart_missing(&self) -> bool {
        self.restart_missing.load(Ordering::Acquire)
    }

    pub fn set_restart_missing(&self, value: bool) {
        self.restart_missing.store(value, Ordering::Release);
    }

    /// Record a verified address; a device that answers needs no power cycle
    pub fn confirm(&self, address: SlaveAddress) {
        self.set_current(Some(address));
        self.set_restart_missing(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_clears_restart_flag() {
        let book = AddressBook::new();
        book.set_current(Some(SlaveAddress::new(4)));
        book.set_restart_missing(true);

        book.confirm(SlaveAddress::new(9));

        assert_eq!(book.current(), Some(SlaveAddress::new(9)));
        assert!(!book.restart_missing());
    }
}
