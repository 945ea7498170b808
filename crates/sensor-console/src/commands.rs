use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use application::{ConnectionManager, SessionTimings};
use domain::{
    BaudRate, BusProtocol, ConfigureOptions, ConnectionState, LinkOpener, Parity, PortEnumerator,
    SensorCatalog, SensorDriver, SerialSettings, SessionEvent, SlaveAddress,
};
use infrastructure::ConsoleConfig;
use infrastructure::SerialPortEnumerator;

use crate::cli::Target;
use crate::observer::LogObserver;

const SETTLE_STEP: Duration = Duration::from_millis(200);
const SIMULATED_PORT: &str = "sim0";

/// Everything a command needs, resolved once at startup
pub struct Console {
    pub catalog: SensorCatalog,
    pub config: ConsoleConfig,
    pub opener: Arc<dyn LinkOpener>,
    pub simulate: bool,
    pub interrupt: CancellationToken,
}

/// A sensor driver plus where to find it
struct Resolved {
    driver: Arc<dyn SensorDriver>,
    settings: SerialSettings,
    address: Option<SlaveAddress>,
}

impl Resolved {
    fn protocol(&self) -> BusProtocol {
        self.driver.model().protocol
    }
}

pub fn list_ports() -> Result<()> {
    let ports = SerialPortEnumerator.list_ports()?;
    if ports.is_empty() {
        warn!("No serial ports found");
        return Ok(());
    }
    let last = ports.len() - 1;
    for (i, port) in ports.iter().enumerate() {
        let marker = if i == last { "*" } else { " " };
        println!("{marker} {port}");
    }
    Ok(())
}

pub fn list_sensors(catalog: &SensorCatalog) -> Result<()> {
    for protocol in [BusProtocol::RegisterBus, BusProtocol::AsciiBus] {
        println!("{protocol}:");
        for name in catalog.by_protocol(protocol) {
            let driver = catalog.create(name)?;
            let presets: Vec<_> = driver.model().presets.iter().map(|p| p.name).collect();
            println!("  {name:<24} presets: {}", presets.join(", "));
            for wire in driver.model().wires {
                println!("      {wire}");
            }
        }
    }
    Ok(())
}

pub fn session_timings(config: &ConsoleConfig) -> SessionTimings {
    SessionTimings {
        join_timeout: Duration::from_millis(config.session.join_timeout_ms),
        test_interval: Duration::from_millis(config.session.test_interval_ms),
        close_timeout: Duration::from_millis(config.session.close_timeout_ms),
    }
}

impl Console {
    fn manager(&self, protocol: BusProtocol) -> ConnectionManager {
        let mut manager =
            ConnectionManager::new(self.opener.clone(), session_timings(&self.config));
        manager.attach(LogObserver::new(protocol));
        manager
    }

    fn resolve(&self, target: &Target) -> Result<Resolved> {
        let name = target
            .sensor
            .as_deref()
            .or(self.config.sensor.as_deref())
            .ok_or_else(|| anyhow!("No sensor given; pass --sensor or set `sensor` in config"))?;
        let driver = self
            .catalog
            .create(name)
            .with_context(|| format!("Unknown sensor {name:?}; see `sensors`"))?;
        let model = *driver.model();

        let preset = match &target.preset {
            Some(p) => Some(
                model
                    .preset(p)
                    .ok_or_else(|| anyhow!("{} has no preset {p:?}", model.name))?,
            ),
            None => None,
        };
        let (default_baud, default_parity) = preset
            .map(|p| (p.baudrate, p.parity))
            .unwrap_or_else(|| model.default_line());

        let baudrate = match target.baudrate {
            Some(raw) => BaudRate::try_from(raw)?,
            None => self.config.serial.baudrate.unwrap_or(default_baud),
        };
        let parity = match &target.parity {
            Some(raw) => raw.parse::<Parity>()?,
            None => self.config.serial.parity.unwrap_or(default_parity),
        };

        let port = match target.port.clone().or_else(|| self.config.serial.port.clone()) {
            Some(port) => port,
            None if self.simulate => SIMULATED_PORT.to_string(),
            None => domain::bus::default_port(&SerialPortEnumerator)
                .ok_or_else(|| anyhow!("No serial port found; pass --port"))?,
        };

        let address = match &target.address {
            Some(raw) => Some(SlaveAddress::parse_for(model.protocol, raw)?),
            None => preset.and_then(|p| p.slave_address),
        };

        let settings = SerialSettings::new(port, baudrate, parity)
            .with_timeout_ms(self.config.serial.timeout_ms);
        info!(
            sensor = model.name,
            port = %settings.port,
            baudrate = %settings.baudrate,
            parity = %settings.parity,
            "Resolved target"
        );

        Ok(Resolved {
            driver,
            settings,
            address,
        })
    }

    /// Connect and wait for discovery to settle, cancelling it on interrupt
    async fn connect(&self, manager: &mut ConnectionManager, target: &Resolved) -> Result<()> {
        manager.set_current_address(target.address);
        manager
            .connect(target.settings.clone(), target.driver.clone())
            .await
            .context("Connect failed")?;

        let mut cancelled = false;
        while manager.settle(SETTLE_STEP).await == ConnectionState::Connecting {
            if self.interrupt.is_cancelled() && !cancelled {
                info!("🛑 Interrupted, stopping discovery...");
                manager.cancel_discovery()?;
                cancelled = true;
            }
        }
        manager.pump().await;

        if manager.state() != ConnectionState::Connected {
            bail!("No {} found on {}", target.driver.model().name, target.settings.port);
        }
        Ok(())
    }

    pub async fn discover(&self, target: &Target) -> Result<()> {
        let resolved = self.resolve(target)?;
        let mut manager = self.manager(resolved.protocol());

        self.connect(&mut manager, &resolved).await?;
        if let Some(address) = manager.current_address() {
            println!("{}", address.display_for(resolved.protocol()));
        }

        manager.disconnect().await?;
        manager.pump().await;
        Ok(())
    }

    pub async fn test(&self, target: &Target, count: Option<usize>) -> Result<()> {
        let resolved = self.resolve(target)?;
        let mut manager = self.manager(resolved.protocol());
        self.connect(&mut manager, &resolved).await?;

        manager.start_test().await?;
        info!("🧪 Testing, press Ctrl-C to stop");

        let mut readings = 0;
        while !self.interrupt.is_cancelled() && manager.state() == ConnectionState::Connected {
            if let Some(SessionEvent::TestSuccess { .. }) =
                manager.next_event_within(SETTLE_STEP).await
            {
                readings += 1;
                if count.is_some_and(|n| readings >= n) {
                    break;
                }
            }
        }

        let lost = manager.state() != ConnectionState::Connected;
        manager.stop_test().await.ok();
        manager.disconnect().await?;
        manager.pump().await;

        if lost {
            bail!("Connection lost after {readings} reading(s)");
        }
        info!(readings, "Test finished");
        Ok(())
    }

    pub async fn configure(
        &self,
        target: &Target,
        new_address: &str,
        new_baudrate: Option<u32>,
        new_parity: Option<&str>,
    ) -> Result<()> {
        let resolved = self.resolve(target)?;
        let protocol = resolved.protocol();
        let new_address = SlaveAddress::parse_for(protocol, new_address)?;
        let options = ConfigureOptions {
            baudrate: new_baudrate.map(BaudRate::try_from).transpose()?,
            parity: new_parity.map(str::parse::<Parity>).transpose()?,
        };

        let mut manager = self.manager(protocol);
        self.connect(&mut manager, &resolved).await?;

        let outcome = manager.configure(new_address, options).await;
        manager.pump().await;
        if outcome.is_ok() && manager.restart_missing() {
            warn!("⚠️ Power cycle the sensor before using its new settings");
        }

        manager.disconnect().await?;
        manager.pump().await;
        outcome.context("Configure failed")?;
        Ok(())
    }
}
