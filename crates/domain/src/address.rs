use crate::bus::BusProtocol;
use crate::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Value object representing the bus-level identifier a device answers to
///
/// Rules:
/// - Register bus: any value in 0..=255
/// - Ascii bus: a single alphanumeric character (0-9, A-Z, a-z), stored as its byte
///
/// An address only means something relative to one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlaveAddress(u8);

impl SlaveAddress {
    pub const MIN: Self = Self(0);
    pub const MAX: Self = Self(u8::MAX);

    /// Create a register-bus address
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// Create an ascii-bus address from its character
    pub fn ascii(c: char) -> Result<Self> {
        if c.is_ascii_alphanumeric() {
            Ok(Self(c as u8))
        } else {
            Err(DomainError::InvalidAddress(format!(
                "{c:?} is not a single alphanumeric character (0-9, A-Z, a-z)"
            )))
        }
    }

    /// Parse user input for the given bus
    pub fn parse_for(protocol: BusProtocol, input: &str) -> Result<Self> {
        let input = input.trim();
        match protocol {
            BusProtocol::RegisterBus => input.parse::<u8>().map(Self).map_err(|_| {
                DomainError::InvalidAddress(format!(
                    "{input:?} must be a number between 0 and 255"
                ))
            }),
            BusProtocol::AsciiBus => {
                let mut chars = input.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Self::ascii(c),
                    _ => Err(DomainError::InvalidAddress(format!(
                        "{input:?} must be exactly one character"
                    ))),
                }
            }
        }
    }

    /// Check the address is usable on the given bus
    pub fn validate_for(self, protocol: BusProtocol) -> Result<Self> {
        match protocol {
            BusProtocol::RegisterBus => Ok(self),
            BusProtocol::AsciiBus => Self::ascii(self.as_char()),
        }
    }

    /// Full register-bus address space in ascending order
    pub fn all() -> impl Iterator<Item = SlaveAddress> {
        (u8::MIN..=u8::MAX).map(Self)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn as_char(self) -> char {
        self.0 as char
    }

    /// Human form: a number on the register bus, the character on the ascii bus
    pub fn display_for(self, protocol: BusProtocol) -> String {
        match protocol {
            BusProtocol::RegisterBus => self.0.to_string(),
            BusProtocol::AsciiBus => self.as_char().to_string(),
        }
    }
}

impl From<u8> for SlaveAddress {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for SlaveAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_address_parse() {
        let addr = SlaveAddress::parse_for(BusProtocol::RegisterBus, "247").unwrap();
        assert_eq!(addr.value(), 247);
    }

    #[test]
    fn test_register_address_out_of_range() {
        assert!(SlaveAddress::parse_for(BusProtocol::RegisterBus, "256").is_err());
        assert!(SlaveAddress::parse_for(BusProtocol::RegisterBus, "-1").is_err());
        assert!(SlaveAddress::parse_for(BusProtocol::RegisterBus, "").is_err());
    }

    #[test]
    fn test_ascii_address_parse() {
        let addr = SlaveAddress::parse_for(BusProtocol::AsciiBus, "b").unwrap();
        assert_eq!(addr.as_char(), 'b');
        assert_eq!(addr.value(), b'b');
        assert_eq!(addr.display_for(BusProtocol::AsciiBus), "b");
    }

    #[test]
    fn test_ascii_address_rejects_symbols_and_long_input() {
        assert!(SlaveAddress::parse_for(BusProtocol::AsciiBus, "?").is_err());
        assert!(SlaveAddress::parse_for(BusProtocol::AsciiBus, "12").is_err());
        assert!(SlaveAddress::parse_for(BusProtocol::AsciiBus, "").is_err());
    }

    #[test]
    fn test_validate_for_ascii_bus() {
        assert!(SlaveAddress::new(b'0').validate_for(BusProtocol::AsciiBus).is_ok());
        assert!(SlaveAddress::new(0).validate_for(BusProtocol::AsciiBus).is_err());
        assert!(SlaveAddress::new(0).validate_for(BusProtocol::RegisterBus).is_ok());
    }

    #[test]
    fn test_all_is_ascending_and_complete() {
        let all: Vec<_> = SlaveAddress::all().collect();
        assert_eq!(all.len(), 256);
        assert_eq!(all.first(), Some(&SlaveAddress::MIN));
        assert_eq!(all.last(), Some(&SlaveAddress::MAX));
        assert!(all.windows(2).all(|w| w[0] < w[1]));
    }
}
