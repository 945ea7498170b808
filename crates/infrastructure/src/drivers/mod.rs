mod ascii;
pub mod modbus;
mod serial;
pub mod simulated_bus;

pub use ascii::AsciiLink;
pub use modbus::ModbusRtuLink;
pub use simulated_bus::{SimulatedBus, SimulatedDevice, SimulatedLink, SimulatedLinkOpener};

use std::sync::Arc;

use async_trait::async_trait;

use domain::{BusLink, BusProtocol, DriverError, LinkOpener, PortEnumerator, SerialSettings};

/// Opens real serial ports, picking the link type from the bus protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialLinkOpener;

#[async_trait]
impl LinkOpener for SerialLinkOpener {
    async fn open(
        &self,
        protocol: BusProtocol,
        settings: &SerialSettings,
    ) -> Result<Arc<dyn BusLink>, DriverError> {
        let link: Arc<dyn BusLink> = match protocol {
            BusProtocol::RegisterBus => Arc::new(ModbusRtuLink::open(settings)?),
            BusProtocol::AsciiBus => Arc::new(AsciiLink::open(settings)?),
        };
        tracing::info!(
            port = %settings.port,
            %protocol,
            baudrate = %settings.baudrate,
            parity = %settings.parity,
            "Serial link opened"
        );
        Ok(link)
    }
}

/// Lists serial ports known to the OS
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortEnumerator;

impl PortEnumerator for SerialPortEnumerator {
    fn list_ports(&self) -> Result<Vec<String>, DriverError> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| DriverError::Transport(format!("Failed to enumerate ports: {e}")))?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }
}
