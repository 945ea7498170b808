use std::sync::{Arc, Mutex};
use std::time::Duration;

use application::{ConnectionManager, LifecycleError, SessionTimings};
use domain::{
    BaudRate, ConfigureOptions, ConnectionState, Parity, SensorDriver, SerialSettings,
    SessionEvent, SlaveAddress,
};
use infrastructure::{SimulatedBus, SimulatedDevice, builtin_catalog};

const SETTLE: Duration = Duration::from_secs(2);

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

fn driver(name: &str) -> Arc<dyn SensorDriver> {
    builtin_catalog().unwrap().create(name).unwrap()
}

fn manager(bus: &SimulatedBus) -> (ConnectionManager, Arc<Mutex<Vec<SessionEvent>>>) {
    let mut manager = ConnectionManager::new(Arc::new(bus.opener()), timings());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    manager.attach(move |event: &SessionEvent| sink.lock().unwrap().push(event.clone()));
    (manager, seen)
}

fn transitions(seen: &Mutex<Vec<SessionEvent>>) -> Vec<(ConnectionState, ConnectionState)> {
    seen.lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_connect_settles_connected_once_address_found() {
    let bus = SimulatedBus::new().with_device(SimulatedDevice::register(5, 0).with_holding(1, &[634]));
    let (mut manager, seen) = manager(&bus);

    manager.connect(settings(), driver("Rika TH")).await.unwrap();
    assert_eq!(manager.state(), ConnectionState::Connecting);

    assert_eq!(manager.settle(SETTLE).await, ConnectionState::Connected);
    assert_eq!(manager.current_address(), Some(SlaveAddress::new(5)));
    assert_eq!(
        transitions(&seen),
        vec![
            (ConnectionState::Disconnected, ConnectionState::Connecting),
            (ConnectionState::Connecting, ConnectionState::Connected),
        ]
    );

    manager.disconnect().await.unwrap();
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_empty_bus_tears_session_down() {
    let bus = SimulatedBus::new();
    let (mut manager, seen) = manager(&bus);

    manager.connect(settings(), driver("Rika TH")).await.unwrap();

    assert_eq!(manager.settle(SETTLE).await, ConnectionState::Disconnected);
    assert!(manager.session().is_none());
    assert_eq!(bus.close_count(), 1);
    let exhausted = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.kind() == "ScanExhausted")
        .count();
    assert_eq!(exhausted, 1);
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let bus = SimulatedBus::new().with_device(SimulatedDevice::register(5, 0));
    let (mut manager, _seen) = manager(&bus);

    manager.connect(settings(), driver("Rika TH")).await.unwrap();
    let err = manager.connect(settings(), driver("Rika TH")).await.unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::InvalidTransition {
            from: ConnectionState::Connecting,
            action: "connect"
        }
    ));
    assert_eq!(bus.open_count(), 1);
    manager.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_refused_port_returns_to_disconnected() {
    let bus = SimulatedBus::new();
    bus.refuse_open(true);
    let (mut manager, seen) = manager(&bus);

    let err = manager.connect(settings(), driver("Rika TH")).await.unwrap_err();

    assert!(matches!(err, LifecycleError::Connect(_)));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    manager.pump().await;
    assert!(seen.lock().unwrap().iter().any(|e| e.kind() == "SessionConnectFailed"));
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let bus = SimulatedBus::new().with_device(SimulatedDevice::register(5, 0));
    let (mut manager, _seen) = manager(&bus);

    manager.disconnect().await.unwrap();
    manager.connect(settings(), driver("Rika TH")).await.unwrap();
    manager.settle(SETTLE).await;
    manager.disconnect().await.unwrap();
    manager.disconnect().await.unwrap();

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(bus.close_count(), 1);
}

#[tokio::test]
async fn test_requires_connected_state() {
    let bus = SimulatedBus::new();
    let (mut manager, _seen) = manager(&bus);

    let err = manager.start_test().await.unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::InvalidTransition {
            from: ConnectionState::Disconnected,
            ..
        }
    ));
}

#[tokio::test]
async fn test_transport_failure_while_testing_forces_disconnect() {
    let bus = SimulatedBus::new().with_device(SimulatedDevice::register(5, 0).with_holding(1, &[634]));
    let (mut manager, seen) = manager(&bus);
    manager.connect(settings(), driver("Rika TH")).await.unwrap();
    assert_eq!(manager.settle(SETTLE).await, ConnectionState::Connected);

    manager.start_test().await.unwrap();
    bus.fail_transport_at(SlaveAddress::new(5));

    let outcome = tokio::time::timeout(SETTLE, async {
        while manager.state() != ConnectionState::Disconnected {
            if manager.next_event().await.is_none() {
                break;
            }
        }
    })
    .await;

    assert!(outcome.is_ok());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(seen.lock().unwrap().iter().any(|e| matches!(
        e,
        SessionEvent::TestFailure { transport: true, .. }
    )));
    assert_eq!(bus.close_count(), 1);
}

#[tokio::test]
async fn test_configure_then_reconnect_after_power_cycle() {
    let bus = SimulatedBus::new().with_device(
        SimulatedDevice::register(5, 0)
            .with_holding(1, &[634])
            .needing_power_cycle(),
    );
    let (mut manager, _seen) = manager(&bus);
    manager.connect(settings(), driver("Rika TH")).await.unwrap();
    assert_eq!(manager.settle(SETTLE).await, ConnectionState::Connected);

    manager
        .configure(SlaveAddress::new(21), ConfigureOptions::default())
        .await
        .unwrap();
    assert!(manager.restart_missing());
    assert_eq!(manager.current_address(), Some(SlaveAddress::new(21)));
    manager.disconnect().await.unwrap();

    // Not yet restarted: the new address stays silent
    manager.connect(settings(), driver("Rika TH")).await.unwrap();
    assert_eq!(manager.settle(SETTLE).await, ConnectionState::Disconnected);
    assert!(manager.restart_missing());

    bus.power_cycle();
    manager.connect(settings(), driver("Rika TH")).await.unwrap();
    assert_eq!(manager.settle(SETTLE).await, ConnectionState::Connected);
    assert_eq!(manager.current_address(), Some(SlaveAddress::new(21)));
    assert!(!manager.restart_missing());

    manager.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_cancel_discovery_returns_to_disconnected() {
    let bus = SimulatedBus::new();
    bus.set_response_delay(Duration::from_millis(5));
    let (mut manager, _seen) = manager(&bus);
    manager.connect(settings(), driver("Rika TH")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    manager.cancel_discovery().unwrap();

    assert_eq!(manager.settle(SETTLE).await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_ascii_bus_connects_through_address_query() {
    let bus = SimulatedBus::new()
        .with_device(SimulatedDevice::ascii('b').with_ascii_values("+2.5-1.0"));
    let (mut manager, seen) = manager(&bus);

    manager
        .connect(settings(), driver("Apogee Radiation Frost"))
        .await
        .unwrap();
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(manager.current_address(), Some(SlaveAddress::new(b'b')));

    manager.start_test().await.unwrap();
    let reading = tokio::time::timeout(SETTLE, async {
        loop {
            match manager.next_event().await {
                Some(SessionEvent::TestSuccess { reading, .. }) => break reading,
                Some(_) => continue,
                None => panic!("event queue closed"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(reading.get("leaf temperature [°C]"), Some(2.5));

    manager.disconnect().await.unwrap();
    manager.pump().await;
    let kinds: Vec<_> = seen.lock().unwrap().iter().map(|e| e.kind()).collect();
    assert!(kinds.contains(&"TestCancelled"));
    assert_eq!(kinds.last(), Some(&"StateChanged"));
}

#[tokio::test]
async fn test_silent_ascii_bus_reports_no_device() {
    let bus = SimulatedBus::new();
    let (mut manager, _seen) = manager(&bus);

    let err = manager
        .connect(settings(), driver("Apogee Radiation Frost"))
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::NoDevice));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(bus.close_count(), 1);
}
