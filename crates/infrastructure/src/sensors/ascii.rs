use std::time::Duration;

use async_trait::async_trait;

use domain::{
    BaudRate, BusLink, BusPreset, BusProtocol, ConfigureOptions, DriverError, Parity, Reading,
    SensorDriver, SensorModel, SlaveAddress, Wire,
};

const PRESETS: &[BusPreset] = &[
    BusPreset {
        name: "insolight",
        baudrate: BaudRate::B1200,
        parity: Parity::None,
        slave_address: None,
    },
    BusPreset {
        name: "factory",
        baudrate: BaudRate::B19200,
        parity: Parity::Even,
        slave_address: Some(SlaveAddress::new(b'1')),
    },
];

static RADIATION_FROST: SensorModel = SensorModel {
    name: "Apogee Radiation Frost",
    protocol: BusProtocol::AsciiBus,
    presets: PRESETS,
    needs_power_cycle_before_setup: false,
    can_broadcast_read: true,
    can_broadcast_setup: true,
    wires: &[
        Wire::solid("V+", "red"),
        Wire::solid("Ground", "black"),
        Wire::solid("SDI-12 Data", "white"),
    ],
};

const LABELS: &[&str] = &["leaf temperature [°C]", "bud temperature [°C]"];

/// Longest measurement wait honored from an `aM!` reply
const MAX_MEASUREMENT_WAIT: Duration = Duration::from_secs(10);

/// Apogee radiation frost detector on the ascii bus
#[derive(Debug, Default)]
pub struct ApogeeRadiationFrost;

impl ApogeeRadiationFrost {
    pub fn new() -> Self {
        Self
    }
}

/// Strip the leading address echo from a reply
fn body<'a>(reply: &'a str, address: SlaveAddress) -> Result<&'a str, DriverError> {
    reply.strip_prefix(address.as_char()).ok_or_else(|| {
        DriverError::Protocol(format!(
            "reply {reply:?} does not come from address {}",
            address.as_char()
        ))
    })
}

/// `+1.25-0.5` -> `[1.25, -0.5]`
fn parse_values(data: &str) -> Result<Vec<f64>, DriverError> {
    let mut values = Vec::new();
    let mut start = None;
    for (i, c) in data.char_indices() {
        if c == '+' || c == '-' {
            if let Some(s) = start {
                values.push(parse_value(&data[s..i])?);
            }
            start = Some(i);
        }
    }
    match start {
        Some(s) => values.push(parse_value(&data[s..])?),
        None if data.is_empty() => {}
        None => {
            return Err(DriverError::Protocol(format!(
                "value without sign in {data:?}"
            )));
        }
    }
    Ok(values)
}

fn parse_value(token: &str) -> Result<f64, DriverError> {
    token
        .parse()
        .map_err(|_| DriverError::Protocol(format!("malformed value {token:?}")))
}

#[async_trait]
impl SensorDriver for ApogeeRadiationFrost {
    fn model(&self) -> &SensorModel {
        &RADIATION_FROST
    }

    async fn probe(&self, link: &dyn BusLink, address: SlaveAddress) -> Result<bool, DriverError> {
        match link.transact(&format!("{}!", address.as_char())).await {
            Ok(reply) => Ok(reply == address.as_char().to_string()),
            Err(e) if e.is_protocol() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn query_address(&self, link: &dyn BusLink) -> Result<Option<SlaveAddress>, DriverError> {
        let reply = link.transact("?!").await?;
        let mut chars = reply.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(SlaveAddress::ascii(c).ok()),
            _ => {
                tracing::debug!(%reply, "Unexpected address query reply");
                Ok(None)
            }
        }
    }

    async fn request_measurement(
        &self,
        link: &dyn BusLink,
        address: SlaveAddress,
    ) -> Result<(), DriverError> {
        let reply = link.transact(&format!("{}M!", address.as_char())).await?;
        let body = body(&reply, address)?;
        // atttn: seconds until ready, then the value count
        let seconds: u64 = body
            .get(..3)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| DriverError::Protocol(format!("malformed measure reply {reply:?}")))?;
        let wait = Duration::from_secs(seconds).min(MAX_MEASUREMENT_WAIT);
        if !wait.is_zero() {
            tracing::trace!(address = %address.as_char(), ?wait, "Waiting for measurement");
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    async fn read(&self, link: &dyn BusLink, address: SlaveAddress) -> Result<Reading, DriverError> {
        let reply = link.transact(&format!("{}D0!", address.as_char())).await?;
        let values = parse_values(body(&reply, address)?)?;
        if values.is_empty() {
            return Err(DriverError::Protocol("no values in data reply".into()));
        }

        let mut reading = Reading::new();
        for (i, value) in values.into_iter().enumerate() {
            match LABELS.get(i) {
                Some(label) => reading.insert(*label, value),
                None => reading.insert(format!("value {}", i + 1), value),
            }
        }
        Ok(reading)
    }

    async fn configure(
        &self,
        link: &dyn BusLink,
        current: SlaveAddress,
        new: SlaveAddress,
        options: &ConfigureOptions,
    ) -> Result<(), DriverError> {
        if options.baudrate.is_some() || options.parity.is_some() {
            return Err(DriverError::Unsupported(
                "line settings are fixed on the ascii bus".into(),
            ));
        }
        let new = new
            .validate_for(BusProtocol::AsciiBus)
            .map_err(|e| DriverError::Unsupported(e.to_string()))?;

        let reply = link
            .transact(&format!("{}A{}!", current.as_char(), new.as_char()))
            .await?;
        if reply != new.as_char().to_string() {
            return Err(DriverError::Protocol(format!(
                "address change not acknowledged: {reply:?}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{SimulatedBus, SimulatedDevice};
    use domain::SerialSettings;

    fn addr(c: char) -> SlaveAddress {
        SlaveAddress::ascii(c).unwrap()
    }

    fn link(bus: &SimulatedBus) -> crate::drivers::SimulatedLink {
        let settings =
            SerialSettings::new("sim1", BaudRate::B1200, Parity::None).with_timeout_ms(20);
        bus.open_link(BusProtocol::AsciiBus, &settings).unwrap()
    }

    #[test]
    fn test_parse_signed_values() {
        assert_eq!(parse_values("+1.5-2.25").unwrap(), vec![1.5, -2.25]);
        assert_eq!(parse_values("-0.1").unwrap(), vec![-0.1]);
        assert!(parse_values("").unwrap().is_empty());
        assert!(parse_values("1.5").is_err());
        assert!(parse_values("+1.5+x").is_err());
    }

    #[tokio::test]
    async fn test_query_then_read() {
        let bus = SimulatedBus::new()
            .with_device(SimulatedDevice::ascii('7').with_ascii_values("+3.5-1.25"));
        let link = link(&bus);
        let sensor = ApogeeRadiationFrost::new();

        assert_eq!(sensor.query_address(&link).await.unwrap(), Some(addr('7')));
        assert!(sensor.probe(&link, addr('7')).await.unwrap());
        assert!(!sensor.probe(&link, addr('8')).await.unwrap());

        sensor.request_measurement(&link, addr('7')).await.unwrap();
        let reading = sensor.read(&link, addr('7')).await.unwrap();
        assert_eq!(reading.get("leaf temperature [°C]"), Some(3.5));
        assert_eq!(reading.get("bud temperature [°C]"), Some(-1.25));
    }

    #[tokio::test]
    async fn test_configure_changes_address() {
        let bus = SimulatedBus::new().with_device(SimulatedDevice::ascii('0'));
        let link = link(&bus);
        let sensor = ApogeeRadiationFrost::new();

        sensor
            .configure(&link, addr('0'), addr('c'), &ConfigureOptions::default())
            .await
            .unwrap();
        assert_eq!(bus.device_address(0), Some(addr('c')));
    }

    #[tokio::test]
    async fn test_configure_rejects_line_settings() {
        let bus = SimulatedBus::new().with_device(SimulatedDevice::ascii('0'));
        let link = link(&bus);
        let options = ConfigureOptions {
            baudrate: Some(BaudRate::B9600),
            parity: None,
        };

        let err = ApogeeRadiationFrost::new()
            .configure(&link, addr('0'), addr('c'), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Unsupported(_)));
    }
}
