//! Domain layer - sensor bus concepts with no I/O of their own
//!
//! This crate contains:
//! - Value objects (SlaveAddress, SerialSettings, BaudRate, Parity)
//! - State machines (ConnectionState, DiscoveryState)
//! - Session events and the observer contract
//! - Capability traits implemented elsewhere (BusLink, LinkOpener, SensorDriver)
//! - The sensor catalog assembled once at startup
//!
//! Principles:
//! - No dependencies on serial ports or runtimes
//! - Invalid addresses and bus settings are rejected at construction
//! - Testable in isolation

pub mod address;
pub mod bus;
pub mod discovery;
pub mod error;
pub mod event;
pub mod sensor;

// Re-export commonly used types
pub use address::SlaveAddress;
pub use bus::{
    BaudRate, BusLink, BusProtocol, ConnectionState, LinkOpener, Parity, PortEnumerator,
    SerialSettings,
};
pub use discovery::DiscoveryState;
pub use error::{ConnectError, DomainError, DriverError, NoHandleError};
pub use event::{CancelReason, SessionEvent, SessionId, SessionObserver};
pub use sensor::{
    BusPreset, ConfigureOptions, Reading, SensorCatalog, SensorCatalogBuilder, SensorDriver,
    SensorModel, Wire,
};
