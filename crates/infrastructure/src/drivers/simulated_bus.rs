//! In-memory RS-485 bus with scriptable devices.
//!
//! Used by `--simulate` in the console and by the integration tests. Devices
//! answer the same frames the built-in drivers send; absent addresses time
//! out, and faults can be injected per address.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use domain::{BusLink, BusProtocol, DriverError, LinkOpener, SerialSettings, SlaveAddress};

#[derive(Debug, Clone)]
enum DeviceKind {
    Register {
        address_register: u16,
        holding: HashMap<u16, u16>,
        input: HashMap<u16, u16>,
    },
    Ascii {
        values: String,
        measure_seconds: u16,
    },
}

/// One device on the simulated bus
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    address: SlaveAddress,
    pending_address: Option<SlaveAddress>,
    needs_power_cycle: bool,
    kind: DeviceKind,
}

impl SimulatedDevice {
    /// Register-bus device; writing `address_register` changes its address
    pub fn register(address: u8, address_register: u16) -> Self {
        Self {
            address: SlaveAddress::new(address),
            pending_address: None,
            needs_power_cycle: false,
            kind: DeviceKind::Register {
                address_register,
                holding: HashMap::new(),
                input: HashMap::new(),
            },
        }
    }

    /// Ascii-bus device answering to a single character
    pub fn ascii(address: char) -> Self {
        Self {
            address: SlaveAddress::new(address as u8),
            pending_address: None,
            needs_power_cycle: false,
            kind: DeviceKind::Ascii {
                values: "+0.0".into(),
                measure_seconds: 0,
            },
        }
    }

    pub fn with_holding(mut self, start: u16, values: &[u16]) -> Self {
        if let DeviceKind::Register { holding, .. } = &mut self.kind {
            for (offset, value) in values.iter().enumerate() {
                holding.insert(start + offset as u16, *value);
            }
        }
        self
    }

    pub fn with_input(mut self, start: u16, values: &[u16]) -> Self {
        if let DeviceKind::Register { input, .. } = &mut self.kind {
            for (offset, value) in values.iter().enumerate() {
                input.insert(start + offset as u16, *value);
            }
        }
        self
    }

    /// Values returned by `aD0!`, e.g. `+1.5-2.25`
    pub fn with_ascii_values(mut self, data: &str) -> Self {
        if let DeviceKind::Ascii { values, .. } = &mut self.kind {
            *values = data.to_string();
        }
        self
    }

    /// Address changes only take effect after `SimulatedBus::power_cycle`
    pub fn needing_power_cycle(mut self) -> Self {
        self.needs_power_cycle = true;
        self
    }

    fn protocol(&self) -> BusProtocol {
        match self.kind {
            DeviceKind::Register { .. } => BusProtocol::RegisterBus,
            DeviceKind::Ascii { .. } => BusProtocol::AsciiBus,
        }
    }

    fn readdress(&mut self, new: SlaveAddress) {
        if self.needs_power_cycle {
            self.pending_address = Some(new);
        } else {
            self.address = new;
        }
    }

    fn read(&self, input_bank: bool, register: u16, count: u16) -> Result<Vec<u16>, DriverError> {
        let DeviceKind::Register {
            address_register,
            holding,
            input,
        } = &self.kind
        else {
            return Err(DriverError::Protocol("not a register device".into()));
        };
        let bank = if input_bank { input } else { holding };

        (register..register.saturating_add(count))
            .map(|reg| {
                if !input_bank && reg == *address_register {
                    return Ok(u16::from(self.address.value()));
                }
                bank.get(&reg).copied().ok_or_else(|| {
                    DriverError::Protocol(format!("Modbus exception: IllegalDataAddress ({reg})"))
                })
            })
            .collect()
    }

    fn write(&mut self, register: u16, values: &[u16]) -> Result<(), DriverError> {
        let DeviceKind::Register {
            address_register,
            holding,
            ..
        } = &mut self.kind
        else {
            return Err(DriverError::Protocol("not a register device".into()));
        };

        if register == *address_register {
            let raw = values.first().copied().unwrap_or_default();
            let new = u8::try_from(raw).map_err(|_| {
                DriverError::Protocol(format!("Modbus exception: IllegalDataValue ({raw})"))
            })?;
            self.readdress(SlaveAddress::new(new));
            return Ok(());
        }
        for (offset, value) in values.iter().enumerate() {
            holding.insert(register + offset as u16, *value);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BusState {
    devices: Vec<SimulatedDevice>,
    transport_faults: Vec<SlaveAddress>,
    response_delay: Duration,
    refuse_open: bool,
    open_count: usize,
    close_count: usize,
    rejected_after_close: usize,
}

/// Shared bus; clones see the same devices
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    state: Arc<Mutex<BusState>>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, device: SimulatedDevice) -> Self {
        self.add_device(device);
        self
    }

    pub fn add_device(&self, device: SimulatedDevice) {
        self.state().devices.push(device);
    }

    /// Every request to `address` fails as if the cable was pulled
    pub fn fail_transport_at(&self, address: SlaveAddress) {
        self.state().transport_faults.push(address);
    }

    pub fn clear_faults(&self) {
        self.state().transport_faults.clear();
    }

    /// Time each transaction holds the wire
    pub fn set_response_delay(&self, delay: Duration) {
        self.state().response_delay = delay;
    }

    pub fn refuse_open(&self, refuse: bool) {
        self.state().refuse_open = refuse;
    }

    /// Apply address changes waiting for a restart
    pub fn power_cycle(&self) {
        for device in &mut self.state().devices {
            if let Some(pending) = device.pending_address.take() {
                device.address = pending;
            }
        }
    }

    pub fn device_address(&self, index: usize) -> Option<SlaveAddress> {
        self.state().devices.get(index).map(|d| d.address)
    }

    pub fn open_count(&self) -> usize {
        self.state().open_count
    }

    pub fn close_count(&self) -> usize {
        self.state().close_count
    }

    /// Requests that reached a link after it was closed
    pub fn rejected_after_close(&self) -> usize {
        self.state().rejected_after_close
    }

    pub fn opener(&self) -> SimulatedLinkOpener {
        SimulatedLinkOpener { bus: self.clone() }
    }

    pub fn open_link(
        &self,
        protocol: BusProtocol,
        settings: &SerialSettings,
    ) -> Result<SimulatedLink, DriverError> {
        let mut state = self.state();
        if state.refuse_open {
            return Err(DriverError::Transport(format!(
                "Failed to open serial port {}: device not present",
                settings.port
            )));
        }
        state.open_count += 1;
        Ok(SimulatedLink {
            bus: self.clone(),
            protocol,
            port: settings.port.clone(),
            timeout_ms: settings.timeout_ms,
            wire: tokio::sync::Mutex::new(true),
            closed: AtomicBool::new(false),
        })
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn response_delay(&self) -> Duration {
        self.state().response_delay
    }

    /// Run `f` against the first device of `protocol` answering at `address`
    fn on_device<T>(
        &self,
        protocol: BusProtocol,
        address: SlaveAddress,
        timeout_ms: u64,
        f: impl FnOnce(&mut SimulatedDevice) -> Result<T, DriverError>,
    ) -> Result<T, DriverError> {
        let mut state = self.state();
        if state.transport_faults.contains(&address) {
            return Err(DriverError::Transport("Broken pipe (os error 32)".into()));
        }
        match state
            .devices
            .iter_mut()
            .find(|d| d.protocol() == protocol && d.address == address)
        {
            Some(device) => f(device),
            None => Err(DriverError::Timeout(timeout_ms)),
        }
    }

    fn ascii_command(&self, request: &str, timeout_ms: u64) -> Result<String, DriverError> {
        let body = request
            .strip_suffix('!')
            .ok_or_else(|| DriverError::Protocol(format!("malformed command {request:?}")))?;

        if body == "?" {
            let state = self.state();
            if state
                .transport_faults
                .iter()
                .any(|a| state.devices.iter().any(|d| d.address == *a))
            {
                return Err(DriverError::Transport("Broken pipe (os error 32)".into()));
            }
            return state
                .devices
                .iter()
                .find(|d| d.protocol() == BusProtocol::AsciiBus)
                .map(|d| d.address.as_char().to_string())
                .ok_or(DriverError::Timeout(timeout_ms));
        }

        let mut chars = body.chars();
        let address = chars
            .next()
            .ok_or_else(|| DriverError::Protocol("empty command".into()))?;
        let verb: String = chars.collect();
        let address = SlaveAddress::new(address as u8);

        self.on_device(BusProtocol::AsciiBus, address, timeout_ms, |device| {
            let DeviceKind::Ascii {
                values,
                measure_seconds,
            } = &device.kind
            else {
                return Err(DriverError::Protocol("not an ascii device".into()));
            };
            let a = device.address.as_char();
            match verb.as_str() {
                "" => Ok(a.to_string()),
                "M" => {
                    let count = values.matches(['+', '-']).count();
                    Ok(format!("{a}{measure_seconds:03}{count}"))
                }
                "D0" => Ok(format!("{a}{values}")),
                _ => match verb.strip_prefix('A').map(|rest| rest.chars().collect::<Vec<_>>()) {
                    Some(new) if new.len() == 1 && new[0].is_ascii_alphanumeric() => {
                        device.readdress(SlaveAddress::new(new[0] as u8));
                        Ok(new[0].to_string())
                    }
                    _ => Err(DriverError::Protocol(format!("unknown command {request:?}"))),
                },
            }
        })
    }
}

/// Link onto a `SimulatedBus`; behaves like a real port, including the wire lock
pub struct SimulatedLink {
    bus: SimulatedBus,
    protocol: BusProtocol,
    port: String,
    timeout_ms: u64,
    /// `false` once closed
    wire: tokio::sync::Mutex<bool>,
    closed: AtomicBool,
}

impl SimulatedLink {
    async fn transaction<T>(
        &self,
        expected: BusProtocol,
        f: impl FnOnce(&SimulatedBus) -> Result<T, DriverError>,
    ) -> Result<T, DriverError> {
        let open = self.wire.lock().await;
        if !*open {
            self.bus.state().rejected_after_close += 1;
            return Err(DriverError::NoHandle);
        }
        if self.protocol != expected {
            return Err(DriverError::Unsupported(format!(
                "{expected} request on the {} bus",
                self.protocol
            )));
        }
        let delay = self.bus.response_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        f(&self.bus)
    }
}

#[async_trait]
impl BusLink for SimulatedLink {
    fn protocol(&self) -> BusProtocol {
        self.protocol
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
        self.transaction(BusProtocol::RegisterBus, |bus| {
            bus.on_device(BusProtocol::RegisterBus, slave, self.timeout_ms, |d| {
                d.read(false, register, count)
            })
        })
        .await
    }

    async fn read_input_registers(
        &self,
        slave: SlaveAddress,
        register: u16,
        count: u16,
    ) -> Result<Vec<u16>, DriverError> {
        self.transaction(BusProtocol::RegisterBus, |bus| {
            bus.on_device(BusProtocol::RegisterBus, slave, self.timeout_ms, |d| {
                d.read(true, register, count)
            })
        })
        .await
    }

    async fn write_register(
        &self,
        slave: SlaveAddress,
        register: u16,
        value: u16,
    ) -> Result<(), DriverError> {
        self.transaction(BusProtocol::RegisterBus, |bus| {
            bus.on_device(BusProtocol::RegisterBus, slave, self.timeout_ms, |d| {
                d.write(register, &[value])
            })
        })
        .await
    }

    async fn write_registers(
        &self,
        slave: SlaveAddress,
        register: u16,
        values: &[u16],
    ) -> Result<(), DriverError> {
        self.transaction(BusProtocol::RegisterBus, |bus| {
            bus.on_device(BusProtocol::RegisterBus, slave, self.timeout_ms, |d| {
                d.write(register, values)
            })
        })
        .await
    }

    async fn transact(&self, request: &str) -> Result<String, DriverError> {
        self.transaction(BusProtocol::AsciiBus, |bus| {
            bus.ascii_command(request, self.timeout_ms)
        })
        .await
    }

    async fn close(&self) -> Result<(), DriverError> {
        let mut open = self.wire.lock().await;
        self.closed.store(true, Ordering::Release);
        if *open {
            *open = false;
            self.bus.state().close_count += 1;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// `LinkOpener` handing out links onto one simulated bus
#[derive(Debug, Clone)]
pub struct SimulatedLinkOpener {
    bus: SimulatedBus,
}

#[async_trait]
impl LinkOpener for SimulatedLinkOpener {
    async fn open(
        &self,
        protocol: BusProtocol,
        settings: &SerialSettings,
    ) -> Result<Arc<dyn BusLink>, DriverError> {
        let link = self.bus.open_link(protocol, settings)?;
        tracing::debug!(port = %settings.port, %protocol, "Simulated link opened");
        Ok(Arc::new(link))
    }
}
