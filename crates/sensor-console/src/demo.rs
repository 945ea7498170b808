use infrastructure::{SimulatedBus, SimulatedDevice};

/// In-memory bus used by `--simulate`.
///
/// One register sensor at 17 answering like a Rika TH or Rika Par, and one
/// ascii radiation-frost sensor at `a`.
pub fn demo_bus() -> SimulatedBus {
    SimulatedBus::new()
        .with_device(SimulatedDevice::register(17, 0x42).with_holding(0, &[215, 634]))
        .with_device(SimulatedDevice::ascii('a').with_ascii_values("+1.85-0.42"))
}
