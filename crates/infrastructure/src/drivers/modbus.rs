use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::error::Elapsed;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

use domain::{BusLink, BusProtocol, DriverError, SerialSettings, SlaveAddress};

use super::serial;

/// Register-bus link: Modbus RTU over a serial port.
///
/// One transaction at a time holds the wire; the slave id is switched per
/// request since the whole bus shares one context.
pub struct ModbusRtuLink {
    port: String,
    timeout: Duration,
    wire: Mutex<Option<Context>>,
    closed: AtomicBool,
}

impl ModbusRtuLink {
    pub fn open(settings: &SerialSettings) -> Result<Self, DriverError> {
        let stream = serial::open_stream(settings)?;
        let ctx = rtu::attach_slave(stream, Slave(1));
        Ok(Self::with_context(
            &settings.port,
            ctx,
            Duration::from_millis(settings.timeout_ms),
        ))
    }

    pub fn with_context(port: impl Into<String>, ctx: Context, timeout: Duration) -> Self {
        Self {
            port: port.into(),
            timeout,
            wire: Mutex::new(Some(ctx)),
            closed: AtomicBool::new(false),
        }
    }

    fn settle<T>(
        &self,
        result: Result<tokio_modbus::Result<T>, Elapsed>,
    ) -> Result<T, DriverError> {
        match result {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(exception))) => {
                Err(DriverError::Protocol(format!("Modbus exception: {exception:?}")))
            }
            Ok(Err(tokio_modbus::Error::Transport(e))) => {
                Err(serial::classify_io("Modbus transport error", &e))
            }
            Ok(Err(tokio_modbus::Error::Protocol(e))) => {
                Err(DriverError::Protocol(format!("Modbus protocol error: {e}")))
            }
            Err(_) => Err(DriverError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

#[async_trait]
impl BusLink for ModbusRtuLink {
    fn protocol(&self) -> BusProtocol {
        BusProtocol::RegisterBus
    }

    fn port(&self) -> &str {
        &self.port
    }

    async fn read_holding_registers(
        &self,
        slave: SlaveAddress,
        register: u16,
        count: u16,
    ) -> Result<Vec<u16>, DriverError> {
        let mut wire = self.wire.lock().await;
        let ctx = wire.as_mut().ok_or(DriverError::NoHandle)?;
        ctx.set_slave(Slave(slave.value()));
        tracing::trace!(slave = slave.value(), register, count, "read holding");
        let result =
            tokio::time::timeout(self.timeout, ctx.read_holding_registers(register, count)).await;
        self.settle(result)
    }

    async fn read_input_registers(
        &self,
        slave: SlaveAddress,
        register: u16,
        count: u16,
    ) -> Result<Vec<u16>, DriverError> {
        let mut wire = self.wire.lock().await;
        let ctx = wire.as_mut().ok_or(DriverError::NoHandle)?;
        ctx.set_slave(Slave(slave.value()));
        tracing::trace!(slave = slave.value(), register, count, "read input");
        let result =
            tokio::time::timeout(self.timeout, ctx.read_input_registers(register, count)).await;
        self.settle(result)
    }

    async fn write_register(
        &self,
        slave: SlaveAddress,
        register: u16,
        value: u16,
    ) -> Result<(), DriverError> {
        let mut wire = self.wire.lock().await;
        let ctx = wire.as_mut().ok_or(DriverError::NoHandle)?;
        ctx.set_slave(Slave(slave.value()));
        tracing::debug!(slave = slave.value(), register, value, "write single register");
        let result =
            tokio::time::timeout(self.timeout, ctx.write_single_register(register, value)).await;
        self.settle(result)
    }

    async fn write_registers(
        &self,
        slave: SlaveAddress,
        register: u16,
        values: &[u16],
    ) -> Result<(), DriverError> {
        let mut wire = self.wire.lock().await;
        let ctx = wire.as_mut().ok_or(DriverError::NoHandle)?;
        ctx.set_slave(Slave(slave.value()));
        tracing::debug!(slave = slave.value(), register, ?values, "write multiple registers");
        let result =
            tokio::time::timeout(self.timeout, ctx.write_multiple_registers(register, values))
                .await;
        self.settle(result)
    }

    async fn close(&self) -> Result<(), DriverError> {
        // Waits for an in-flight transaction to release the wire
        let mut wire = self.wire.lock().await;
        self.closed.store(true, Ordering::Release);
        if let Some(ctx) = wire.take() {
            drop(ctx);
            tracing::debug!(port = %self.port, "Modbus port closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
