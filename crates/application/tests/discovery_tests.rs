use std::sync::Arc;
use std::time::Duration;

use application::{AddressBook, DeviceSession, EventBus, EventQueue, SessionTimings};
use domain::{
    BaudRate, BusProtocol, CancelReason, DiscoveryState, Parity, SensorDriver, SerialSettings,
    SessionEvent, SlaveAddress,
};
use infrastructure::{SimulatedBus, SimulatedDevice, builtin_catalog};

// --- Helpers ---

fn settings() -> SerialSettings {
    SerialSettings::new("sim0", BaudRate::B9600, Parity::None).with_timeout_ms(20)
}

fn timings() -> SessionTimings {
    SessionTimings {
        join_timeout: Duration::from_millis(500),
        test_interval: Duration::from_millis(10),
        close_timeout: Duration::from_millis(200),
    }
}

fn rika_th() -> Arc<dyn SensorDriver> {
    builtin_catalog().unwrap().create("Rika TH").unwrap()
}

async fn open(bus: &SimulatedBus, addressing: Arc<AddressBook>) -> (DeviceSession, EventQueue) {
    let (sink, queue) = EventBus::channel();
    let session = DeviceSession::connect(
        settings(),
        rika_th(),
        &bus.opener(),
        sink,
        addressing,
        timings(),
    )
    .await
    .expect("simulated port opens");
    (session, queue)
}

fn scanned(events: &[SessionEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Scanning { address, .. } => Some(address.value()),
            _ => None,
        })
        .collect()
}

fn count(events: &[SessionEvent], kind: &str) -> usize {
    events.iter().filter(|e| e.kind() == kind).count()
}

// --- Tests ---

#[tokio::test]
async fn test_scan_stops_at_first_responding_address() {
    let bus = SimulatedBus::new().with_device(SimulatedDevice::register(5, 0).with_holding(1, &[634]));
    let addressing = Arc::new(AddressBook::new());
    let (mut session, mut queue) = open(&bus, addressing.clone()).await;

    session.start_discovery().await.unwrap();
    let state = session.await_discovery().await;

    assert_eq!(state, Some(DiscoveryState::Found(SlaveAddress::new(5))));
    assert_eq!(session.discovery_state(), DiscoveryState::Found(SlaveAddress::new(5)));
    assert_eq!(addressing.current(), Some(SlaveAddress::new(5)));

    let events = queue.drain();
    assert_eq!(scanned(&events), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(count(&events, "AddressFound"), 1);
    assert_eq!(count(&events, "ScanExhausted"), 0);

    session.disconnect().await;
}

#[tokio::test]
async fn test_scan_reports_exactly_the_addresses_up_to_the_device() {
    for target in [0u8, 1, 2, 17, 128, 200, 254, 255] {
        let bus = SimulatedBus::new().with_device(SimulatedDevice::register(target, 0));
        let (mut session, mut queue) = open(&bus, Arc::new(AddressBook::new())).await;

        session.start_discovery().await.unwrap();
        let state = session.await_discovery().await;

        assert_eq!(
            state,
            Some(DiscoveryState::Found(SlaveAddress::new(target))),
            "device at {target}"
        );
        let events = queue.drain();
        assert_eq!(scanned(&events), (0..=target).collect::<Vec<_>>(), "device at {target}");
        let found_at = events
            .iter()
            .position(|e| e.kind() == "AddressFound")
            .expect("address announced");
        assert!(events[found_at..].iter().all(|e| e.kind() != "Scanning"));

        session.disconnect().await;
    }
}

#[tokio::test]
async fn test_empty_bus_exhausts_every_address_once() {
    let bus = SimulatedBus::new();
    let (mut session, mut queue) = open(&bus, Arc::new(AddressBook::new())).await;

    session.start_discovery().await.unwrap();
    let state = session.await_discovery().await;

    assert_eq!(state, Some(DiscoveryState::NotFound));
    let events = queue.drain();
    assert_eq!(scanned(&events).len(), 256);
    assert_eq!(count(&events, "ScanExhausted"), 1);
    assert_eq!(count(&events, "AddressFound"), 0);

    session.disconnect().await;
}

#[tokio::test]
async fn test_known_address_short_circuits_scan() {
    let bus = SimulatedBus::new().with_device(SimulatedDevice::register(42, 0).with_holding(1, &[500]));
    let addressing = Arc::new(AddressBook::new());
    addressing.set_current(Some(SlaveAddress::new(42)));
    let (mut session, mut queue) = open(&bus, addressing).await;

    session.start_discovery().await.unwrap();
    let state = session.await_discovery().await;

    assert_eq!(state, Some(DiscoveryState::Found(SlaveAddress::new(42))));
    let events = queue.drain();
    let kinds: Vec<_> = events.iter().map(SessionEvent::kind).collect();
    assert!(kinds.contains(&"VerifyingCurrentId"));
    assert!(kinds.contains(&"CurrentIdValid"));
    assert!(scanned(&events).is_empty());

    session.disconnect().await;
}

#[tokio::test]
async fn test_stale_address_falls_back_to_scan() {
    let bus = SimulatedBus::new().with_device(SimulatedDevice::register(3, 0).with_holding(1, &[500]));
    let addressing = Arc::new(AddressBook::new());
    addressing.set_current(Some(SlaveAddress::new(40)));
    let (mut session, mut queue) = open(&bus, addressing.clone()).await;

    session.start_discovery().await.unwrap();
    let state = session.await_discovery().await;

    assert_eq!(state, Some(DiscoveryState::Found(SlaveAddress::new(3))));
    assert_eq!(addressing.current(), Some(SlaveAddress::new(3)));
    let events = queue.drain();
    assert_eq!(count(&events, "SlaveIdInvalid"), 1);
    assert_eq!(scanned(&events), vec![0, 1, 2, 3]);

    session.disconnect().await;
}

#[tokio::test]
async fn test_pending_reconfiguration_requires_reboot() {
    let bus = SimulatedBus::new().with_device(SimulatedDevice::register(3, 0));
    let addressing = Arc::new(AddressBook::new());
    addressing.set_current(Some(SlaveAddress::new(12)));
    addressing.set_restart_missing(true);
    let (mut session, mut queue) = open(&bus, addressing.clone()).await;

    session.start_discovery().await.unwrap();
    let state = session.await_discovery().await;

    assert_eq!(state, Some(DiscoveryState::RebootRequired));
    assert!(addressing.restart_missing());
    let events = queue.drain();
    assert_eq!(count(&events, "SlaveIdInvalid"), 1);
    assert_eq!(count(&events, "RebootRequired"), 1);
    assert!(scanned(&events).is_empty());

    session.disconnect().await;
}

#[tokio::test]
async fn test_successful_verification_clears_restart_flag() {
    let bus = SimulatedBus::new().with_device(SimulatedDevice::register(12, 0).with_holding(1, &[1]));
    let addressing = Arc::new(AddressBook::new());
    addressing.set_current(Some(SlaveAddress::new(12)));
    addressing.set_restart_missing(true);
    let (mut session, _queue) = open(&bus, addressing.clone()).await;

    session.start_discovery().await.unwrap();
    session.await_discovery().await;

    assert!(!addressing.restart_missing());
    session.disconnect().await;
}

#[tokio::test]
async fn test_cancel_stops_scan_with_requested_reason() {
    let bus = SimulatedBus::new();
    bus.set_response_delay(Duration::from_millis(5));
    let (mut session, mut queue) = open(&bus, Arc::new(AddressBook::new())).await;

    session.start_discovery().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    session.cancel_discovery();
    let state = session.await_discovery().await;

    assert_eq!(state, Some(DiscoveryState::Cancelled));
    let events = queue.drain();
    let probed = scanned(&events);
    assert!(probed.len() < 256);
    assert!(probed.iter().copied().eq(0..probed.len() as u8));
    assert_eq!(count(&events, "ScanExhausted"), 0);

    let cancelled_at = events
        .iter()
        .position(|e| {
            matches!(
                e,
                SessionEvent::ScanCancelled {
                    reason: CancelReason::Requested,
                    ..
                }
            )
        })
        .expect("scan reports its cancellation");
    assert!(
        events[cancelled_at..]
            .iter()
            .all(|e| e.kind() != "Scanning")
    );

    session.disconnect().await;
}

#[tokio::test]
async fn test_transport_failure_aborts_scan() {
    let bus = SimulatedBus::new().with_device(SimulatedDevice::register(9, 0));
    bus.fail_transport_at(SlaveAddress::new(2));
    let (mut session, mut queue) = open(&bus, Arc::new(AddressBook::new())).await;

    session.start_discovery().await.unwrap();
    let state = session.await_discovery().await;

    assert_eq!(state, Some(DiscoveryState::Cancelled));
    let events = queue.drain();
    assert_eq!(scanned(&events), vec![0, 1, 2]);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::ScanCancelled {
            reason: CancelReason::Transport(_),
            ..
        }
    )));

    session.disconnect().await;
}

#[tokio::test]
async fn test_restarting_discovery_replaces_previous_run() {
    let bus = SimulatedBus::new();
    bus.set_response_delay(Duration::from_millis(5));
    let (mut session, mut queue) = open(&bus, Arc::new(AddressBook::new())).await;

    session.start_discovery().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    bus.set_response_delay(Duration::ZERO);
    bus.add_device(SimulatedDevice::register(200, 0));
    session.start_discovery().await.unwrap();
    let state = session.await_discovery().await;

    assert_eq!(state, Some(DiscoveryState::Found(SlaveAddress::new(200))));
    let events = queue.drain();
    assert_eq!(count(&events, "ScanCancelled"), 1);
    assert_eq!(count(&events, "AddressFound"), 1);

    session.disconnect().await;
}

#[tokio::test]
async fn test_ascii_scan_probes_alphanumeric_addresses() {
    let bus = SimulatedBus::new().with_device(SimulatedDevice::ascii('C'));
    let driver = builtin_catalog().unwrap().create("Apogee Radiation Frost").unwrap();
    let (sink, mut queue) = EventBus::channel();
    let mut session = DeviceSession::connect(
        settings(),
        driver,
        &bus.opener(),
        sink,
        Arc::new(AddressBook::new()),
        timings(),
    )
    .await
    .unwrap();
    assert_eq!(session.protocol(), BusProtocol::AsciiBus);

    session.start_discovery().await.unwrap();
    let state = session.await_discovery().await;

    assert_eq!(state, Some(DiscoveryState::Found(SlaveAddress::new(b'C'))));
    let probed: String = scanned(&queue.drain()).into_iter().map(char::from).collect();
    assert_eq!(probed, "0123456789ABC");

    session.disconnect().await;
}
