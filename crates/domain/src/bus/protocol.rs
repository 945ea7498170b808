use serde::{Deserialize, Serialize};

use super::settings::{BaudRate, Parity};

/// Wire protocol spoken on the shared RS-485 bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusProtocol {
    /// Request/response protocol addressing numbered registers (Modbus RTU)
    RegisterBus,
    /// Single-character addresses and command verbs (SDI-12 style)
    AsciiBus,
}

impl BusProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegisterBus => "register",
            Self::AsciiBus => "ascii",
        }
    }

    /// Serial settings a fresh port is opened with when nothing else is given
    pub fn default_line(&self) -> (BaudRate, Parity) {
        match self {
            Self::RegisterBus => (BaudRate::B9600, Parity::None),
            Self::AsciiBus => (BaudRate::B1200, Parity::Even),
        }
    }

    /// Whether the bus can answer "who is there" directly instead of being scanned
    pub fn has_address_query(&self) -> bool {
        matches!(self, Self::AsciiBus)
    }
}

impl std::fmt::Display for BusProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_as_str() {
        assert_eq!(BusProtocol::RegisterBus.as_str(), "register");
        assert_eq!(BusProtocol::AsciiBus.as_str(), "ascii");
    }

    #[test]
    fn test_default_line_settings() {
        assert_eq!(
            BusProtocol::RegisterBus.default_line(),
            (BaudRate::B9600, Parity::None)
        );
        assert_eq!(
            BusProtocol::AsciiBus.default_line(),
            (BaudRate::B1200, Parity::Even)
        );
    }

    #[test]
    fn test_only_ascii_bus_has_address_query() {
        assert!(BusProtocol::AsciiBus.has_address_query());
        assert!(!BusProtocol::RegisterBus.has_address_query());
    }
}
