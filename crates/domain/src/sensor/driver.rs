use async_trait::async_trait;

use super::model::SensorModel;
use super::reading::Reading;
use crate::address::SlaveAddress;
use crate::bus::{BaudRate, BusLink, Parity};
use crate::error::DriverError;

/// Line settings to apply alongside a new address. `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigureOptions {
    pub baudrate: Option<BaudRate>,
    pub parity: Option<Parity>,
}

/// Sensor driver trait that infrastructure implementations must provide
///
/// Drivers hold no connection of their own; every call borrows the session's
/// link for the duration of one transaction sequence.
#[async_trait]
pub trait SensorDriver: Send + Sync {
    fn model(&self) -> &SensorModel;

    /// Check whether a device of this model answers at `address`.
    ///
    /// `Ok(false)` for silence or a malformed reply; transport and no-handle
    /// errors propagate.
    async fn probe(&self, link: &dyn BusLink, address: SlaveAddress) -> Result<bool, DriverError>;

    /// Acquire one reading from the device at `address`
    async fn read(&self, link: &dyn BusLink, address: SlaveAddress)
    -> Result<Reading, DriverError>;

    /// Assign a new address (and optionally new line settings) to the device
    async fn configure(
        &self,
        link: &dyn BusLink,
        current: SlaveAddress,
        new: SlaveAddress,
        options: &ConfigureOptions,
    ) -> Result<(), DriverError>;

    /// Start a measurement; models that sample continuously need nothing
    async fn request_measurement(
        &self,
        _link: &dyn BusLink,
        _address: SlaveAddress,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    /// Ask the bus which address its single device uses.
    /// Only buses with an address query answer with `Some`.
    async fn query_address(&self, _link: &dyn BusLink) -> Result<Option<SlaveAddress>, DriverError> {
        Ok(None)
    }
}
