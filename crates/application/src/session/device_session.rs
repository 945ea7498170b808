use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use domain::{
    BusLink, BusProtocol, ConfigureOptions, ConnectError, DiscoveryState, DriverError, LinkOpener,
    NoHandleError, SensorDriver, SerialSettings, SessionEvent, SessionId, SlaveAddress,
};

use super::address_book::AddressBook;
use super::test_task::{TestMode, TestTask};
use super::timings::SessionTimings;
use super::worker::Worker;
use crate::discovery::AddressDiscovery;
use crate::error::{LifecycleError, Result};
use crate::event_bus::EventSink;

/// State a session shares with its workers.
///
/// Workers never keep the link outside one call: they borrow a clone of it
/// through [`SessionShared::with_handle`] and drop it when the call returns.
pub(crate) struct SessionShared {
    pub(crate) id: SessionId,
    pub(crate) protocol: BusProtocol,
    pub(crate) settings: SerialSettings,
    pub(crate) driver: Arc<dyn SensorDriver>,
    pub(crate) events: EventSink,
    pub(crate) addressing: Arc<AddressBook>,
    discovery_state: Mutex<DiscoveryState>,
    /// Guards the slot only; no I/O runs while it is held
    slot: Mutex<Option<Arc<dyn BusLink>>>,
}

impl SessionShared {
    pub(crate) fn handle(&self) -> std::result::Result<Arc<dyn BusLink>, NoHandleError> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.clone().ok_or(NoHandleError)
    }

    /// Run one I/O sequence against the link.
    ///
    /// The slot lock is released before `f` runs. A cleared slot yields
    /// `DriverError::NoHandle`, as does a link closed mid-call.
    pub(crate) async fn with_handle<T, F, Fut>(&self, f: F) -> std::result::Result<T, DriverError>
    where
        F: FnOnce(Arc<dyn BusLink>) -> Fut,
        Fut: Future<Output = std::result::Result<T, DriverError>>,
    {
        let link = self.handle()?;
        f(link).await
    }

    fn take_handle(&self) -> Option<Arc<dyn BusLink>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn discovery_state(&self) -> DiscoveryState {
        *self
            .discovery_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_discovery_state(&self, state: DiscoveryState) {
        *self
            .discovery_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// One open physical connection and the background protocols running on it
pub struct DeviceSession {
    shared: Arc<SessionShared>,
    timings: SessionTimings,
    discovery: Option<Worker<DiscoveryState>>,
    test: Option<Worker<()>>,
}

impl DeviceSession {
    /// Open the port for `driver`'s bus and announce the session
    pub async fn connect(
        settings: SerialSettings,
        driver: Arc<dyn SensorDriver>,
        opener: &dyn LinkOpener,
        events: EventSink,
        addressing: Arc<AddressBook>,
        timings: SessionTimings,
    ) -> std::result::Result<Self, ConnectError> {
        let protocol = driver.model().protocol;
        info!(
            port = %settings.port,
            %protocol,
            baudrate = %settings.baudrate,
            parity = %settings.parity,
            sensor = driver.model().name,
            "Opening session"
        );

        let link = match opener.open(protocol, &settings).await {
            Ok(link) => link,
            Err(e) => {
                warn!(port = %settings.port, error = %e, "Failed to open port");
                events.emit(SessionEvent::session_connect_failed(
                    &settings.port,
                    e.to_string(),
                ));
                return Err(ConnectError::TransportUnavailable {
                    port: settings.port.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let id = SessionId::new();
        events.emit(SessionEvent::session_connected(
            id,
            &settings.port,
            protocol,
            settings.baudrate.as_u32(),
            settings.parity,
        ));
        info!(session_id = %id, port = %settings.port, "Session connected");

        Ok(Self {
            shared: Arc::new(SessionShared {
                id,
                protocol,
                settings,
                driver,
                events,
                addressing,
                discovery_state: Mutex::new(DiscoveryState::Idle),
                slot: Mutex::new(Some(link)),
            }),
            timings,
            discovery: None,
            test: None,
        })
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn protocol(&self) -> BusProtocol {
        self.shared.protocol
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.shared.settings
    }

    pub fn driver(&self) -> &Arc<dyn SensorDriver> {
        &self.shared.driver
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    pub fn current_address(&self) -> Option<SlaveAddress> {
        self.shared.addressing.current()
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.shared.discovery_state()
    }

    pub fn is_discovering(&self) -> bool {
        self.discovery.as_ref().is_some_and(Worker::is_running)
    }

    pub fn is_testing(&self) -> bool {
        self.test.as_ref().is_some_and(Worker::is_running)
    }

    /// Clone of the link, or `NoHandleError` once the session is torn down
    pub fn handle(&self) -> std::result::Result<Arc<dyn BusLink>, NoHandleError> {
        self.shared.handle()
    }

    /// Run `f` against the link without holding the slot lock.
    ///
    /// `DriverError::NoHandle` is the typed "no handle" outcome: the session
    /// was torn down before or during the call. Treat it as a cancellation.
    pub async fn with_handle<T, F, Fut>(&self, f: F) -> std::result::Result<T, DriverError>
    where
        F: FnOnce(Arc<dyn BusLink>) -> Fut,
        Fut: Future<Output = std::result::Result<T, DriverError>>,
    {
        self.shared.with_handle(f).await
    }

    /// Start a fresh discovery run. A previous run is cancelled and joined first,
    /// as is a running test loop.
    pub async fn start_discovery(&mut self) -> Result<()> {
        if !self.is_open() {
            return Err(LifecycleError::NotConnected);
        }
        self.stop_test().await;
        if let Some(previous) = self.discovery.take() {
            previous.cancel();
            previous.join_within(self.timings.join_timeout).await;
        }

        self.shared.set_discovery_state(DiscoveryState::Idle);
        let cancel = CancellationToken::new();
        let discovery = AddressDiscovery::new(self.shared.clone(), cancel.clone());
        self.discovery = Some(Worker::spawn("discovery", cancel, discovery.run()));
        Ok(())
    }

    pub fn cancel_discovery(&self) {
        if let Some(worker) = &self.discovery {
            info!(session_id = %self.id(), "Cancelling discovery");
            worker.cancel();
        }
    }

    /// Wait for the current discovery run to reach a terminal state
    pub async fn await_discovery(&mut self) -> Option<DiscoveryState> {
        self.discovery.take()?.join().await
    }

    /// Start polling the current address. Refused while discovery runs.
    pub async fn start_test(&mut self) -> Result<()> {
        if !self.is_open() {
            return Err(LifecycleError::NotConnected);
        }
        if self.is_discovering() {
            return Err(LifecycleError::Busy("discovery in progress"));
        }
        if self.current_address().is_none() {
            return Err(LifecycleError::NoAddress);
        }
        self.stop_test().await;

        let cancel = CancellationToken::new();
        let task = TestTask::new(
            self.shared.clone(),
            cancel.clone(),
            TestMode::for_protocol(self.protocol()),
            self.timings.test_interval,
        );
        self.test = Some(Worker::spawn("test", cancel, task.run()));
        Ok(())
    }

    pub async fn stop_test(&mut self) {
        if let Some(worker) = self.test.take() {
            worker.cancel();
            worker.join_within(self.timings.join_timeout).await;
        }
    }

    /// Ask the bus which address its device uses (ascii bus)
    pub async fn fetch_address(&self) -> std::result::Result<Option<SlaveAddress>, DriverError> {
        let driver = &self.shared.driver;
        let found = self
            .with_handle(|link| async move { driver.query_address(link.as_ref()).await })
            .await?;
        if let Some(address) = found {
            debug!(session_id = %self.id(), address = %address.display_for(self.protocol()), "Address query answered");
            self.shared.addressing.confirm(address);
        }
        Ok(found)
    }

    /// Move the device at the current address to `new`.
    ///
    /// On the register bus the device only applies the change after a
    /// reconnect, so the address book is flagged for a power cycle.
    pub async fn configure(&mut self, new: SlaveAddress, options: &ConfigureOptions) -> Result<()> {
        if !self.is_open() {
            return Err(LifecycleError::NotConnected);
        }
        if self.is_discovering() {
            return Err(LifecycleError::Busy("discovery in progress"));
        }
        let current = self.current_address().ok_or(LifecycleError::NoAddress)?;
        let protocol = self.protocol();
        let new = new.validate_for(protocol)?;

        info!(
            session_id = %self.id(),
            from = %current.display_for(protocol),
            to = %new.display_for(protocol),
            "Configuring sensor"
        );
        let driver = &self.shared.driver;
        self.with_handle(|link| async move {
            driver.configure(link.as_ref(), current, new, options).await
        })
        .await?;

        let addressing = &self.shared.addressing;
        addressing.set_current(Some(new));
        if protocol == BusProtocol::RegisterBus {
            addressing.set_restart_missing(true);
        }
        self.shared
            .events
            .emit(SessionEvent::sensor_configured(self.id(), current, new));
        Ok(())
    }

    /// Tear the session down. Safe to call more than once; only the first call
    /// closes the link and emits `SessionDisconnected`.
    pub async fn disconnect(&mut self) {
        let discovery = self.discovery.take();
        let test = self.test.take();

        // Signal both before waiting on either
        if let Some(worker) = &discovery {
            worker.cancel();
        }
        if let Some(worker) = &test {
            worker.cancel();
        }

        let limit = self.timings.join_timeout;
        tokio::join!(
            async move {
                if let Some(worker) = discovery {
                    worker.join_within(limit).await;
                }
            },
            async move {
                if let Some(worker) = test {
                    worker.join_within(limit).await;
                }
            }
        );

        // The slot is empty before close starts
        let Some(link) = self.shared.take_handle() else {
            debug!(session_id = %self.id(), "Session already closed");
            return;
        };

        match tokio::time::timeout(self.timings.close_timeout, link.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(session_id = %self.id(), error = %e, "Error closing port, ignored"),
            Err(_) => warn!(session_id = %self.id(), "Closing port timed out"),
        }
        drop(link);

        info!(session_id = %self.id(), port = %self.settings().port, "Session disconnected");
        self.shared
            .events
            .emit(SessionEvent::session_disconnected(self.id()));
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.is_open() {
            warn!(session_id = %self.id(), "Session dropped without disconnect");
        }
    }
}
