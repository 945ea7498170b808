//! Infrastructure layer - serial links, built-in sensors, configuration

pub mod config;
pub mod drivers;
pub mod sensors;

pub use config::ConsoleConfig;
pub use drivers::{
    AsciiLink, ModbusRtuLink, SerialLinkOpener, SerialPortEnumerator, SimulatedBus,
    SimulatedDevice, SimulatedLinkOpener,
};
pub use sensors::builtin_catalog;
