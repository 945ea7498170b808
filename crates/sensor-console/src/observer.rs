use domain::{BusProtocol, SessionEvent, SessionObserver};
use tracing::{debug, info, trace, warn};

/// Writes every session event to the log, at a level fixed per event kind
pub struct LogObserver {
    protocol: BusProtocol,
}

impl LogObserver {
    pub fn new(protocol: BusProtocol) -> Self {
        Self { protocol }
    }
}

impl SessionObserver for LogObserver {
    fn on_event(&mut self, event: &SessionEvent) {
        let protocol = self.protocol;
        let addr = |a: &domain::SlaveAddress| a.display_for(protocol);

        match event {
            SessionEvent::SessionConnected {
                port,
                baudrate,
                parity,
                ..
            } => info!("🔌 Connected to {port} ({baudrate} {parity})"),
            SessionEvent::SessionConnectFailed { port, reason, .. } => {
                warn!("❌ Could not open {port}: {reason}")
            }
            SessionEvent::SessionDisconnected { .. } => warn!("🔌 Disconnected"),
            SessionEvent::StateChanged { from, to, .. } => debug!(%from, %to, "State changed"),
            SessionEvent::VerifyingCurrentId { address, .. } => {
                info!("🔎 Checking address {}", addr(address))
            }
            SessionEvent::CurrentIdValid { address, .. } => {
                info!("✅ Sensor still answers at {}", addr(address))
            }
            SessionEvent::SlaveIdInvalid { address, .. } => {
                info!("No answer at {}, scanning the bus", addr(address))
            }
            SessionEvent::Scanning { address, .. } => trace!("Probing {}", addr(address)),
            SessionEvent::AddressFound { address, .. } => {
                info!("✅ Sensor found at address {}", addr(address))
            }
            SessionEvent::ScanExhausted { .. } => warn!("No sensor answered on the bus"),
            SessionEvent::ScanCancelled { reason, .. } => warn!(?reason, "Scan cancelled"),
            SessionEvent::RebootRequired { address, .. } => warn!(
                "⚠️ Sensor was reconfigured to {}; power cycle it and reconnect at the new settings",
                addr(address)
            ),
            SessionEvent::SensorConfigured {
                previous, address, ..
            } => info!(
                "🛠️ Sensor moved from {} to {}",
                addr(previous),
                addr(address)
            ),
            SessionEvent::TestSuccess { reading, .. } => info!("📈 {reading}"),
            SessionEvent::TestFailure { address, error, .. } => match address {
                Some(address) => warn!("Read at {} failed: {error}", addr(address)),
                None => warn!("Read failed: {error}"),
            },
            SessionEvent::TestCancelled { .. } => debug!("Test loop stopped"),
        }
    }
}
