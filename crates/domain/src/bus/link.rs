use std::sync::Arc;

use async_trait::async_trait;

use super::protocol::BusProtocol;
use super::settings::SerialSettings;
use crate::address::SlaveAddress;
use crate::error::DriverError;

/// An open connection to the bus.
///
/// Implementations serialize transactions internally, so a configuration
/// write and a poll never interleave on the wire. Every operation on a closed
/// link returns `DriverError::NoHandle`. Register operations on an ascii link
/// (and the reverse) are `Unsupported`.
#[async_trait]
pub trait BusLink: Send + Sync {
    fn protocol(&self) -> BusProtocol;

    /// Port the link was opened on
    fn port(&self) -> &str;

    async fn read_holding_registers(
        &self,
        _slave: SlaveAddress,
        _register: u16,
        _count: u16,
    ) -> Result<Vec<u16>, DriverError> {
        Err(unsupported(self.protocol(), "read_holding_registers"))
    }

    async fn read_input_registers(
        &self,
        _slave: SlaveAddress,
        _register: u16,
        _count: u16,
    ) -> Result<Vec<u16>, DriverError> {
        Err(unsupported(self.protocol(), "read_input_registers"))
    }

    async fn write_register(
        &self,
        _slave: SlaveAddress,
        _register: u16,
        _value: u16,
    ) -> Result<(), DriverError> {
        Err(unsupported(self.protocol(), "write_register"))
    }

    async fn write_registers(
        &self,
        _slave: SlaveAddress,
        _register: u16,
        _values: &[u16],
    ) -> Result<(), DriverError> {
        Err(unsupported(self.protocol(), "write_registers"))
    }

    /// Send one ascii command and return the reply line without its terminator
    async fn transact(&self, _request: &str) -> Result<String, DriverError> {
        Err(unsupported(self.protocol(), "transact"))
    }

    /// Close the physical connection. Idempotent; waits for an in-flight
    /// transaction to finish.
    async fn close(&self) -> Result<(), DriverError>;

    fn is_closed(&self) -> bool;
}

fn unsupported(protocol: BusProtocol, operation: &str) -> DriverError {
    DriverError::Unsupported(format!("{operation} on the {protocol} bus"))
}

/// Opens bus links; the transport behind `DeviceSession::connect`
#[async_trait]
pub trait LinkOpener: Send + Sync {
    async fn open(
        &self,
        protocol: BusProtocol,
        settings: &SerialSettings,
    ) -> Result<Arc<dyn BusLink>, DriverError>;
}

/// Lists the serial ports currently visible to the OS
#[cfg_attr(test, mockall::automock)]
pub trait PortEnumerator: Send + Sync {
    fn list_ports(&self) -> Result<Vec<String>, DriverError>;
}

/// Port preselected for the user: the most recently enumerated one.
pub fn default_port(ports: &dyn PortEnumerator) -> Option<String> {
    match ports.list_ports() {
        Ok(list) => list.last().cloned(),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_last_listed() {
        let mut ports = MockPortEnumerator::new();
        ports
            .expect_list_ports()
            .times(1)
            .returning(|| Ok(vec!["/dev/ttyS0".into(), "/dev/ttyUSB0".into()]));

        assert_eq!(default_port(&ports), Some("/dev/ttyUSB0".to_string()));
    }

    #[test]
    fn test_default_port_none_when_enumeration_fails() {
        let mut ports = MockPortEnumerator::new();
        ports
            .expect_list_ports()
            .returning(|| Err(DriverError::Transport("udev unavailable".into())));

        assert_eq!(default_port(&ports), None);
    }

    #[test]
    fn test_default_port_none_when_empty() {
        let mut ports = MockPortEnumerator::new();
        ports.expect_list_ports().returning(|| Ok(Vec::new()));

        assert_eq!(default_port(&ports), None);
    }
}
