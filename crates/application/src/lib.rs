//! Application layer - session orchestration on top of the domain contracts
//!
//! - `event_bus`: hand-off of worker events to the single consumer
//! - `session`: one open connection plus its test loop
//! - `discovery`: verify-then-scan search for the sensor's address
//! - `lifecycle`: the connect / disconnect state machine driving it all

pub mod discovery;
pub mod error;
pub mod event_bus;
pub mod lifecycle;
pub mod session;

pub use error::LifecycleError;
pub use event_bus::{EventBus, EventQueue, EventSink};
pub use lifecycle::ConnectionManager;
pub use session::{AddressBook, DeviceSession, SessionTimings, TestMode};
