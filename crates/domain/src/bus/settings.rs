use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// Baudrates a sensor on the bus can be configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BaudRate {
    B1200,
    B2400,
    B4800,
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl BaudRate {
    pub const ALL: [BaudRate; 8] = [
        Self::B1200,
        Self::B2400,
        Self::B4800,
        Self::B9600,
        Self::B19200,
        Self::B38400,
        Self::B57600,
        Self::B115200,
    ];

    pub fn as_u32(&self) -> u32 {
        match self {
            Self::B1200 => 1200,
            Self::B2400 => 2400,
            Self::B4800 => 4800,
            Self::B9600 => 9600,
            Self::B19200 => 19200,
            Self::B38400 => 38400,
            Self::B57600 => 57600,
            Self::B115200 => 115200,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = DomainError;

    fn try_from(value: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|b| b.as_u32() == value)
            .ok_or(DomainError::InvalidBaudRate(value))
    }
}

impl From<BaudRate> for u32 {
    fn from(value: BaudRate) -> Self {
        value.as_u32()
    }
}

impl std::fmt::Display for BaudRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Serial parity, written N / E / O
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl Parity {
    pub fn as_char(&self) -> char {
        match self {
            Self::None => 'N',
            Self::Even => 'E',
            Self::Odd => 'O',
        }
    }
}

impl std::str::FromStr for Parity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "N" | "NONE" => Ok(Self::None),
            "E" | "EVEN" => Ok(Self::Even),
            "O" | "ODD" => Ok(Self::Odd),
            _ => Err(DomainError::InvalidParity(s.to_string())),
        }
    }
}

impl TryFrom<String> for Parity {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Parity> for String {
    fn from(value: Parity) -> Self {
        value.as_char().to_string()
    }
}

impl std::fmt::Display for Parity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Everything needed to open one physical connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialSettings {
    pub port: String,
    #[serde(default = "default_baudrate")]
    pub baudrate: BaudRate,
    #[serde(default = "default_parity")]
    pub parity: Parity,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_baudrate() -> BaudRate {
    BaudRate::B9600
}
fn default_parity() -> Parity {
    Parity::None
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_timeout_ms() -> u64 {
    1000
}

impl SerialSettings {
    pub fn new(port: impl Into<String>, baudrate: BaudRate, parity: Parity) -> Self {
        Self {
            port: port.into(),
            baudrate,
            parity,
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baudrate_accepts_only_supported_values() {
        for rate in [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200] {
            assert_eq!(BaudRate::try_from(rate).unwrap().as_u32(), rate);
        }
        assert_eq!(
            BaudRate::try_from(14400),
            Err(DomainError::InvalidBaudRate(14400))
        );
    }

    #[test]
    fn test_parity_parse() {
        assert_eq!("N".parse::<Parity>().unwrap(), Parity::None);
        assert_eq!("e".parse::<Parity>().unwrap(), Parity::Even);
        assert_eq!("Odd".parse::<Parity>().unwrap(), Parity::Odd);
        assert!("M".parse::<Parity>().is_err());
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: SerialSettings =
            serde_json::from_value(serde_json::json!({"port": "COM3"})).unwrap();
        assert_eq!(settings.port, "COM3");
        assert_eq!(settings.baudrate, BaudRate::B9600);
        assert_eq!(settings.parity, Parity::None);
        assert_eq!(settings.timeout_ms, 1000);
    }

    #[test]
    fn test_settings_deserialize_rejects_bad_baudrate() {
        let res: std::result::Result<SerialSettings, _> =
            serde_json::from_value(serde_json::json!({"port": "COM3", "baudrate": 1234}));
        assert!(res.is_err());
    }

    #[test]
    fn test_settings_serialize_compact_line_values() {
        let settings = SerialSettings::new("/dev/ttyUSB0", BaudRate::B19200, Parity::Even);
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["baudrate"], 19200);
        assert_eq!(json["parity"], "E");
    }
}
