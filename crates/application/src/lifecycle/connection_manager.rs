use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use domain::{
    BusProtocol, CancelReason, ConfigureOptions, ConnectionState, DiscoveryState, LinkOpener,
    SensorDriver, SerialSettings, SessionEvent, SessionObserver, SlaveAddress,
};

use crate::error::{LifecycleError, Result};
use crate::event_bus::{EventBus, EventQueue, EventSink};
use crate::session::{AddressBook, DeviceSession, SessionTimings};

/// Top-level state machine over one bus connection.
///
/// Owns the event queue: state only moves when the owner pumps events, so
/// every transition happens on the foreground task.
pub struct ConnectionManager {
    opener: Arc<dyn LinkOpener>,
    timings: SessionTimings,
    addressing: Arc<AddressBook>,
    state: ConnectionState,
    session: Option<DeviceSession>,
    sink: EventSink,
    queue: EventQueue,
}

impl ConnectionManager {
    pub fn new(opener: Arc<dyn LinkOpener>, timings: SessionTimings) -> Self {
        let (sink, queue) = EventBus::channel();
        Self {
            opener,
            timings,
            addressing: Arc::new(AddressBook::new()),
            state: ConnectionState::Disconnected,
            session: None,
            sink,
            queue,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn session(&self) -> Option<&DeviceSession> {
        self.session.as_ref()
    }

    pub fn current_address(&self) -> Option<SlaveAddress> {
        self.addressing.current()
    }

    /// Seed or forget the address the next discovery verifies first
    pub fn set_current_address(&self, address: Option<SlaveAddress>) {
        self.addressing.set_current(address);
    }

    pub fn restart_missing(&self) -> bool {
        self.addressing.restart_missing()
    }

    pub fn discovery_state(&self) -> Option<DiscoveryState> {
        self.session.as_ref().map(DeviceSession::discovery_state)
    }

    pub fn attach(&mut self, observer: impl SessionObserver + 'static) {
        self.queue.attach(observer);
    }

    /// Open a session and find the sensor's address.
    ///
    /// On the register bus this returns while discovery still runs, in
    /// `Connecting`; pump events to see it settle. The ascii bus answers
    /// its address query synchronously.
    pub async fn connect(
        &mut self,
        settings: SerialSettings,
        driver: Arc<dyn SensorDriver>,
    ) -> Result<()> {
        let next = self
            .state
            .to_connecting()
            .map_err(|_| LifecycleError::InvalidTransition {
                from: self.state,
                action: "connect",
            })?;
        self.enter(next);

        let session = match DeviceSession::connect(
            settings,
            driver,
            self.opener.as_ref(),
            self.sink.clone(),
            self.addressing.clone(),
            self.timings,
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                self.enter(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };

        let protocol = session.protocol();
        let session = self.session.insert(session);
        match protocol {
            BusProtocol::RegisterBus => {
                if let Err(e) = session.start_discovery().await {
                    self.teardown().await;
                    return Err(e);
                }
                Ok(())
            }
            BusProtocol::AsciiBus => self.resolve_ascii_address().await,
        }
    }

    async fn resolve_ascii_address(&mut self) -> Result<()> {
        let Some(session) = &self.session else {
            return Err(LifecycleError::NotConnected);
        };
        let id = session.id();

        match session.fetch_address().await {
            Ok(Some(address)) => {
                self.sink.emit(SessionEvent::address_found(id, address));
                self.enter(ConnectionState::Connected);
                Ok(())
            }
            Ok(None) => {
                self.sink.emit(SessionEvent::scan_exhausted(id));
                self.teardown().await;
                Err(LifecycleError::NoDevice)
            }
            // Silence on the address query: nobody on the bus
            Err(e) if e.is_protocol() => {
                self.sink.emit(SessionEvent::scan_exhausted(id));
                self.teardown().await;
                Err(LifecycleError::NoDevice)
            }
            Err(e) => {
                let reason = if e.is_cancellation() {
                    CancelReason::HandleLost
                } else {
                    CancelReason::Transport(e.to_string())
                };
                self.sink.emit(SessionEvent::scan_cancelled(id, reason));
                self.teardown().await;
                Err(e.into())
            }
        }
    }

    /// Close the session from any state. Disconnecting twice is a no-op.
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Disconnected && self.session.is_none() {
            return Ok(());
        }
        self.teardown().await;
        Ok(())
    }

    /// Ask a running discovery to stop; it settles as `Cancelled`
    pub fn cancel_discovery(&self) -> Result<()> {
        let session = self.session.as_ref().ok_or(LifecycleError::NotConnected)?;
        session.cancel_discovery();
        Ok(())
    }

    pub async fn start_test(&mut self) -> Result<()> {
        let session = self.connected_session("start a test")?;
        session.start_test().await
    }

    pub async fn stop_test(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(LifecycleError::NotConnected)?;
        session.stop_test().await;
        Ok(())
    }

    /// Give the connected sensor a new address and optional line settings
    pub async fn configure(
        &mut self,
        new_address: SlaveAddress,
        options: ConfigureOptions,
    ) -> Result<()> {
        let session = self.connected_session("configure")?;
        session.stop_test().await;
        session.configure(new_address, &options).await
    }

    /// Apply everything queued so far; returns how many events were handled
    pub async fn pump(&mut self) -> usize {
        let events = self.queue.drain();
        for event in &events {
            self.apply(event).await;
        }
        events.len()
    }

    /// Wait for the next event and apply it
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let event = self.queue.next().await?;
        self.apply(&event).await;
        Some(event)
    }

    /// Like `next_event`, but gives up after `limit` without an event.
    /// Only the wait is bounded; an event already received is fully applied.
    pub async fn next_event_within(&mut self, limit: Duration) -> Option<SessionEvent> {
        let event = tokio::time::timeout(limit, self.queue.next()).await.ok()??;
        self.apply(&event).await;
        Some(event)
    }

    /// Pump until the manager leaves `Connecting`, or `limit` elapses
    pub async fn settle(&mut self, limit: Duration) -> ConnectionState {
        let deadline = tokio::time::Instant::now() + limit;
        self.pump().await;
        while self.state == ConnectionState::Connecting {
            match tokio::time::timeout_at(deadline, self.queue.next()).await {
                Ok(Some(event)) => self.apply(&event).await,
                Ok(None) | Err(_) => break,
            }
        }
        self.state
    }

    async fn apply(&mut self, event: &SessionEvent) {
        let Some(current) = self.session.as_ref().map(DeviceSession::id) else {
            return;
        };
        if event.session_id() != Some(current) {
            return;
        }

        match (self.state, event) {
            (
                ConnectionState::Connecting,
                SessionEvent::AddressFound { .. } | SessionEvent::CurrentIdValid { .. },
            ) => {
                if let Ok(next) = self.state.to_connected() {
                    self.enter(next);
                }
            }
            (
                ConnectionState::Connecting,
                SessionEvent::ScanExhausted { .. }
                | SessionEvent::RebootRequired { .. }
                | SessionEvent::ScanCancelled { .. },
            ) => {
                info!(outcome = event.kind(), "Discovery ended without a sensor, closing session");
                self.teardown().await;
            }
            (ConnectionState::Connected, SessionEvent::TestFailure { transport: true, error, .. }) => {
                warn!(%error, "Transport failed while testing, forcing disconnect");
                self.teardown().await;
            }
            _ => {}
        }
    }

    fn connected_session(&mut self, action: &'static str) -> Result<&mut DeviceSession> {
        if !self.state.is_connected() {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                action,
            });
        }
        self.session.as_mut().ok_or(LifecycleError::NotConnected)
    }

    async fn teardown(&mut self) {
        if let Ok(next) = self.state.to_disconnecting() {
            self.enter(next);
        }
        if let Some(mut session) = self.session.take() {
            session.disconnect().await;
        }
        self.enter(self.state.to_disconnected());
    }

    fn enter(&mut self, next: ConnectionState) {
        let from = self.state;
        if from == next {
            return;
        }
        self.state = next;
        info!(%from, to = %next, "Connection state changed");
        self.sink.emit(SessionEvent::state_changed(from, next));
    }
}
