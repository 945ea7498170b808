mod connection_state;
mod link;
mod protocol;
mod settings;

pub use connection_state::ConnectionState;
pub use link::{BusLink, LinkOpener, PortEnumerator, default_port};
pub use protocol::BusProtocol;
pub use settings::{BaudRate, Parity, SerialSettings};
