use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use domain::{BusProtocol, DriverError, Reading, SessionEvent, SlaveAddress};

use super::device_session::SessionShared;

/// How one test poll talks to the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestMode {
    /// A single read
    RegisterPoll,
    /// Start a measurement, then fetch it
    AsciiRequestThenRead,
}

impl TestMode {
    pub fn for_protocol(protocol: BusProtocol) -> Self {
        match protocol {
            BusProtocol::RegisterBus => Self::RegisterPoll,
            BusProtocol::AsciiBus => Self::AsciiRequestThenRead,
        }
    }
}

/// Continuous read loop against the current address
pub(crate) struct TestTask {
    session: Arc<SessionShared>,
    cancel: CancellationToken,
    mode: TestMode,
    interval: Duration,
}

impl TestTask {
    pub fn new(
        session: Arc<SessionShared>,
        cancel: CancellationToken,
        mode: TestMode,
        interval: Duration,
    ) -> Self {
        Self {
            session,
            cancel,
            mode,
            interval,
        }
    }

    pub async fn run(self) {
        let id = self.session.id;
        debug!(session_id = %id, mode = ?self.mode, "Test loop started");

        while !self.cancel.is_cancelled() {
            let address = self.session.addressing.current();
            if self.cancel.is_cancelled() {
                break;
            }

            match address {
                Some(address) => {
                    let outcome = self.poll(address).await;
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    match outcome {
                        Ok(None) => break,
                        Ok(Some(reading)) => {
                            trace!(session_id = %id, %reading, "Test poll succeeded");
                            self.session
                                .events
                                .emit(SessionEvent::test_success(id, address, reading));
                        }
                        // Link gone under us: a concurrent disconnect won
                        Err(e) if e.is_cancellation() => break,
                        Err(e) => {
                            warn!(session_id = %id, %address, error = %e, "Test poll failed");
                            self.session.events.emit(SessionEvent::test_failure(
                                id,
                                Some(address),
                                e.to_string(),
                                e.is_transport(),
                            ));
                        }
                    }
                }
                None => {
                    self.session.events.emit(SessionEvent::test_failure(
                        id,
                        None,
                        "no current slave address",
                        false,
                    ));
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        debug!(session_id = %id, "Test loop stopped");
        self.session.events.emit(SessionEvent::test_cancelled(id));
    }

    /// `Ok(None)` when cancelled between the two ascii steps
    async fn poll(&self, address: SlaveAddress) -> Result<Option<Reading>, DriverError> {
        let driver = &self.session.driver;
        if self.mode == TestMode::AsciiRequestThenRead {
            self.session
                .with_handle(|link| async move {
                    driver.request_measurement(link.as_ref(), address).await
                })
                .await?;
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
        }
        self.session
            .with_handle(|link| async move { driver.read(link.as_ref(), address).await })
            .await
            .map(Some)
    }
}
