use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use domain::{
    BusProtocol, CancelReason, DiscoveryState, DriverError, SessionEvent, SlaveAddress,
};

use crate::session::SessionShared;

/// Addresses probed by a scan, in probe order: 0..=255 on the register bus,
/// `0-9A-Za-z` on the ascii bus.
pub fn scan_candidates(protocol: BusProtocol) -> Box<dyn Iterator<Item = SlaveAddress> + Send> {
    match protocol {
        BusProtocol::RegisterBus => Box::new(SlaveAddress::all()),
        BusProtocol::AsciiBus => Box::new(
            ('0'..='9')
                .chain('A'..='Z')
                .chain('a'..='z')
                .map(|c| SlaveAddress::new(c as u8)),
        ),
    }
}

/// Finds which address the session's sensor answers to.
///
/// A known address is verified first; only if it fails is the bus scanned,
/// and the first address to answer wins.
pub(crate) struct AddressDiscovery {
    session: Arc<SessionShared>,
    cancel: CancellationToken,
}

impl AddressDiscovery {
    pub fn new(session: Arc<SessionShared>, cancel: CancellationToken) -> Self {
        Self { session, cancel }
    }

    pub async fn run(self) -> DiscoveryState {
        let state = self.execute().await;
        self.session.set_discovery_state(state);
        info!(session_id = %self.session.id, ?state, "Discovery finished");
        state
    }

    async fn execute(&self) -> DiscoveryState {
        if self.cancel.is_cancelled() {
            return self.cancelled(CancelReason::Requested);
        }

        if let Some(current) = self.session.addressing.current() {
            if let Some(outcome) = self.verify(current).await {
                return outcome;
            }
        }

        self.scan().await
    }

    /// `None` means "fall through to the scan"
    async fn verify(&self, current: SlaveAddress) -> Option<DiscoveryState> {
        let id = self.session.id;
        self.session.set_discovery_state(DiscoveryState::VerifyingCurrent);
        self.emit(SessionEvent::verifying_current_id(id, current));

        let driver = &self.session.driver;
        let outcome = self
            .session
            .with_handle(|link| async move { driver.read(link.as_ref(), current).await })
            .await;

        match outcome {
            Ok(_) => {
                debug!(session_id = %id, %current, "Current address still answers");
                self.session.addressing.confirm(current);
                self.emit(SessionEvent::current_id_valid(id, current));
                Some(DiscoveryState::Found(current))
            }
            Err(e) => {
                if let Some(reason) = classify(&e) {
                    return Some(self.cancelled(reason));
                }
                debug!(session_id = %id, %current, error = %e, "Current address did not answer");
                self.emit(SessionEvent::slave_id_invalid(id, current));
                if self.session.addressing.restart_missing() {
                    warn!(session_id = %id, %current, "Sensor was reconfigured and needs a power cycle");
                    self.emit(SessionEvent::reboot_required(id, current));
                    return Some(DiscoveryState::RebootRequired);
                }
                None
            }
        }
    }

    async fn scan(&self) -> DiscoveryState {
        let id = self.session.id;
        let protocol = self.session.protocol;
        self.session.set_discovery_state(DiscoveryState::Scanning);
        info!(session_id = %id, %protocol, "Scanning bus");

        let driver = &self.session.driver;
        for address in scan_candidates(protocol) {
            if self.cancel.is_cancelled() {
                return self.cancelled(CancelReason::Requested);
            }

            trace!(session_id = %id, address = %address.display_for(protocol), "Probing");
            self.emit(SessionEvent::scanning(id, address));

            let probe = self
                .session
                .with_handle(|link| async move { driver.probe(link.as_ref(), address).await })
                .await;

            match probe {
                Ok(true) => {
                    info!(session_id = %id, address = %address.display_for(protocol), "Sensor found");
                    self.session.addressing.confirm(address);
                    self.emit(SessionEvent::address_found(id, address));
                    return DiscoveryState::Found(address);
                }
                Ok(false) => {}
                Err(e) => match classify(&e) {
                    Some(reason) => return self.cancelled(reason),
                    None => trace!(session_id = %id, %address, error = %e, "No valid answer"),
                },
            }
        }

        info!(session_id = %id, "No sensor answered");
        self.emit(SessionEvent::scan_exhausted(id));
        DiscoveryState::NotFound
    }

    fn cancelled(&self, reason: CancelReason) -> DiscoveryState {
        match &reason {
            CancelReason::Requested => info!(session_id = %self.session.id, "Scan cancelled"),
            CancelReason::HandleLost => debug!(session_id = %self.session.id, "Scan stopped, link closed"),
            CancelReason::Transport(error) => {
                warn!(session_id = %self.session.id, %error, "Scan aborted on transport error")
            }
        }
        self.emit(SessionEvent::scan_cancelled(self.session.id, reason));
        DiscoveryState::Cancelled
    }

    fn emit(&self, event: SessionEvent) {
        self.session.events.emit(event);
    }
}

/// Errors that end a scan; `None` for "nobody valid at this address"
fn classify(error: &DriverError) -> Option<CancelReason> {
    if error.is_cancellation() {
        Some(CancelReason::HandleLost)
    } else if error.is_transport() {
        Some(CancelReason::Transport(error.to_string()))
    } else {
        None
    }
}
