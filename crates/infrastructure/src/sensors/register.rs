use async_trait::async_trait;

use domain::{
    BaudRate, BusLink, BusPreset, BusProtocol, ConfigureOptions, DriverError, Parity, Reading,
    SensorDriver, SensorModel, SlaveAddress, Wire,
};

/// Register bank a channel lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bank {
    Holding,
    Input,
}

/// How a channel's registers decode into a value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Encoding {
    /// One register, divided by `divisor`
    U16 { divisor: f64 },
    /// Two registers, high word first
    F32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Channel {
    pub label: &'static str,
    pub bank: Bank,
    pub register: u16,
    pub encoding: Encoding,
}

/// How configure hands the device its new address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressWrite {
    Single(u16),
    Multiple(u16),
}

/// Registers taking baudrate and parity codes before the address write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCodes {
    pub baudrate_register: u16,
    pub parity_register: u16,
}

/// Everything a register-bus model needs beyond its metadata
#[derive(Debug)]
pub struct RegisterMap {
    pub model: SensorModel,
    /// Read to check a device is present
    pub id_register: u16,
    pub address_write: AddressWrite,
    pub line_codes: Option<LineCodes>,
    pub channels: &'static [Channel],
}

/// Table-driven driver for register-bus sensors
pub struct RegisterSensor {
    map: &'static RegisterMap,
}

impl RegisterSensor {
    pub fn new(map: &'static RegisterMap) -> Self {
        Self { map }
    }

    async fn read_channel(
        &self,
        link: &dyn BusLink,
        address: SlaveAddress,
        channel: &Channel,
    ) -> Result<f64, DriverError> {
        let count = match channel.encoding {
            Encoding::U16 { .. } => 1,
            Encoding::F32 => 2,
        };
        let regs = match channel.bank {
            Bank::Holding => {
                link.read_holding_registers(address, channel.register, count)
                    .await?
            }
            Bank::Input => {
                link.read_input_registers(address, channel.register, count)
                    .await?
            }
        };
        decode(channel, &regs)
    }
}

fn decode(channel: &Channel, regs: &[u16]) -> Result<f64, DriverError> {
    let short = || {
        DriverError::Protocol(format!(
            "short reply for {} at register {}",
            channel.label, channel.register
        ))
    };
    match channel.encoding {
        Encoding::U16 { divisor } => {
            let raw = regs.first().copied().ok_or_else(short)?;
            Ok(f64::from(raw) / divisor)
        }
        Encoding::F32 => match regs {
            [hi, lo, ..] => {
                let bits = (u32::from(*hi) << 16) | u32::from(*lo);
                Ok(f64::from(f32::from_bits(bits)))
            }
            _ => Err(short()),
        },
    }
}

fn baudrate_code(baudrate: BaudRate) -> Result<u16, DriverError> {
    match baudrate {
        BaudRate::B115200 => Ok(0),
        BaudRate::B57600 => Ok(1),
        BaudRate::B38400 => Ok(2),
        BaudRate::B19200 => Ok(3),
        BaudRate::B9600 => Ok(4),
        other => Err(DriverError::Unsupported(format!(
            "baudrate {other} on this sensor"
        ))),
    }
}

fn parity_code(parity: Parity) -> u16 {
    match parity {
        Parity::None => 0,
        Parity::Odd => 1,
        Parity::Even => 2,
    }
}

#[async_trait]
impl SensorDriver for RegisterSensor {
    fn model(&self) -> &SensorModel {
        &self.map.model
    }

    async fn probe(&self, link: &dyn BusLink, address: SlaveAddress) -> Result<bool, DriverError> {
        match link
            .read_holding_registers(address, self.map.id_register, 1)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_protocol() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn read(&self, link: &dyn BusLink, address: SlaveAddress) -> Result<Reading, DriverError> {
        let mut reading = Reading::new();
        for channel in self.map.channels {
            let value = self.read_channel(link, address, channel).await?;
            reading.insert(channel.label, value);
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
        let name = self.map.model.name;
        match self.map.line_codes {
            Some(codes) => {
                if let Some(baudrate) = options.baudrate {
                    let code = baudrate_code(baudrate)?;
                    link.write_registers(current, codes.baudrate_register, &[code])
                        .await?;
                    tracing::debug!(sensor = name, %baudrate, "Baudrate written");
                }
                if let Some(parity) = options.parity {
                    link.write_registers(current, codes.parity_register, &[parity_code(parity)])
                        .await?;
                    tracing::debug!(sensor = name, %parity, "Parity written");
                }
            }
            None if options.baudrate.is_some() || options.parity.is_some() => {
                return Err(DriverError::Unsupported(format!(
                    "{name} only takes a new address"
                )));
            }
            None => {}
        }

        let value = u16::from(new.value());
        match self.map.address_write {
            AddressWrite::Single(register) => link.write_register(current, register, value).await,
            AddressWrite::Multiple(register) => {
                link.write_registers(current, register, &[value]).await
            }
        }
    }
}

const INSOLIGHT: BusPreset = BusPreset {
    name: "insolight",
    baudrate: BaudRate::B9600,
    parity: Parity::None,
    slave_address: None,
};

const APOGEE_FACTORY: BusPreset = BusPreset {
    name: "factory",
    baudrate: BaudRate::B19200,
    parity: Parity::Even,
    slave_address: Some(SlaveAddress::new(1)),
};

const KIPP_FACTORY: BusPreset = BusPreset {
    name: "factory",
    baudrate: BaudRate::B19200,
    parity: Parity::Even,
    slave_address: None,
};

const fn model(
    name: &'static str,
    presets: &'static [BusPreset],
    wires: &'static [Wire],
) -> SensorModel {
    SensorModel {
        name,
        protocol: BusProtocol::RegisterBus,
        presets,
        needs_power_cycle_before_setup: false,
        can_broadcast_read: true,
        can_broadcast_setup: true,
        wires,
    }
}

/// Power pair then bus pair, each a single solid colour
const fn four_wire(
    v_plus: &'static str,
    v_minus: &'static str,
    a: &'static str,
    b: &'static str,
) -> [Wire; 4] {
    [
        Wire::solid("V+", v_plus),
        Wire::solid("V-", v_minus),
        Wire::solid("RS485A", a),
        Wire::solid("RS485B", b),
    ]
}

const RIKA_PAR_WIRES: [Wire; 4] = four_wire("red", "green", "yellow", "blue");
const RIKA_TH_WIRES: [Wire; 4] = four_wire("red", "black", "yellow", "green");
const SEEED_TH_WIRES: [Wire; 4] = four_wire("red", "black", "yellow", "white");
const KIPP_WIRES: [Wire; 4] = four_wire("red", "blue", "yellow", "grey");

// The green V+ band is a setup-only lead
const SEEED_LEAF_WIRES: [Wire; 4] = [
    Wire::banded("V+", ["red", "green", "green"], ["", "SET", "ONLY!"]),
    Wire::solid("V-", "black"),
    Wire::solid("RS485A", "yellow"),
    Wire::solid("RS485B", "white"),
];

const CAMPBELL_WIRES: [Wire; 4] = [
    Wire::banded("V+", ["brown"; 3], ["", "brown", ""]),
    Wire::solid("V-", "blue"),
    Wire::solid("RS485A", "white"),
    Wire::solid("RS485B", "black"),
];

const APOGEE_WIRES: [Wire; 4] = [
    Wire::solid("V+", "red"),
    Wire::banded("V-", ["black", "green", "yellow"], ["", "select", "earth"]),
    Wire::solid("RS485A", "white"),
    Wire::solid("RS485B", "blue"),
];

const fn holding(label: &'static str, register: u16, divisor: f64) -> Channel {
    Channel {
        label,
        bank: Bank::Holding,
        register,
        encoding: Encoding::U16 { divisor },
    }
}

const fn float(label: &'static str, bank: Bank, register: u16) -> Channel {
    Channel {
        label,
        bank,
        register,
        encoding: Encoding::F32,
    }
}

const APOGEE_LINE_CODES: LineCodes = LineCodes {
    baudrate_register: 0x33,
    parity_register: 0x34,
};

pub static RIKA_PAR: RegisterMap = RegisterMap {
    model: model("Rika Par", &[INSOLIGHT], &RIKA_PAR_WIRES),
    id_register: 0,
    address_write: AddressWrite::Single(0x42),
    line_codes: None,
    channels: &[
        holding("radiation [umol/m2/s]", 0, 1.0),
        holding("radiation_watt [W/m2]", 1, 1.0),
    ],
};

pub static RIKA_TH: RegisterMap = RegisterMap {
    model: model("Rika TH", &[INSOLIGHT], &RIKA_TH_WIRES),
    id_register: 0,
    address_write: AddressWrite::Single(0),
    line_codes: None,
    channels: &[holding("T [°C]", 0, 10.0), holding("H [%]", 1, 10.0)],
};

pub static APOGEE_PAR: RegisterMap = RegisterMap {
    model: model("Apogee Par", &[INSOLIGHT, APOGEE_FACTORY], &APOGEE_WIRES),
    id_register: 0x30,
    address_write: AddressWrite::Multiple(0x30),
    line_codes: Some(APOGEE_LINE_CODES),
    channels: &[float("radiation [umol/m2/s]", Bank::Holding, 0)],
};

pub static APOGEE_GHI: RegisterMap = RegisterMap {
    model: model("Apogee Ghi", &[INSOLIGHT, APOGEE_FACTORY], &APOGEE_WIRES),
    id_register: 0x30,
    address_write: AddressWrite::Multiple(0x30),
    line_codes: Some(APOGEE_LINE_CODES),
    channels: &[float("irradiance [W/m2]", Bank::Holding, 0)],
};

pub static SEEED_LEAF_WETNESS: RegisterMap = RegisterMap {
    model: model("Seeed leaf wetness", &[INSOLIGHT], &SEEED_LEAF_WIRES),
    id_register: 0x0200,
    address_write: AddressWrite::Single(0x0200),
    line_codes: None,
    channels: &[
        holding("Temperature [°C]", 0, 100.0),
        holding("Humidity [%]", 1, 100.0),
    ],
};

pub static SEEED_TH: RegisterMap = RegisterMap {
    model: model("Seeed T/H", &[INSOLIGHT], &SEEED_TH_WIRES),
    id_register: 512,
    address_write: AddressWrite::Multiple(512),
    line_codes: None,
    channels: &[
        holding("Temperature [°C]", 0, 100.0),
        holding("Humidity [%]", 1, 100.0),
        holding("Dewpoint [°C]", 2, 100.0),
    ],
};

// Vendor docs list 3216/3217 for the 60 cm depth; the probe answers at 3214/3215
pub static CAMPBELL_SOIL_TH: RegisterMap = RegisterMap {
    model: model("Campbell soil T/H", &[INSOLIGHT], &CAMPBELL_WIRES),
    id_register: 4100,
    address_write: AddressWrite::Single(4100),
    line_codes: None,
    channels: &[
        float("VWC@15cm", Bank::Input, 3201),
        float("Permittivity@15cm", Bank::Input, 3202),
        float("SoilT@15cm", Bank::Input, 3203),
        float("VWC@30cm", Bank::Input, 3205),
        float("Permittivity@30cm", Bank::Input, 3206),
        float("SoilT@30cm", Bank::Input, 3207),
        float("VWC@45cm", Bank::Input, 3209),
        float("Permittivity@45cm", Bank::Input, 3210),
        float("SoilT@45cm", Bank::Input, 3211),
        float("VWC@60cm", Bank::Input, 3213),
        float("Permittivity@60cm", Bank::Input, 3214),
        float("SoilT@60cm", Bank::Input, 3215),
    ],
};

pub static KIPP_ZONEN_RT1: RegisterMap = RegisterMap {
    model: model("Kipp&Zonen RT1", &[INSOLIGHT, KIPP_FACTORY], &KIPP_WIRES),
    id_register: 0,
    address_write: AddressWrite::Single(0),
    line_codes: None,
    channels: &[
        holding("radiation [W/m2]", 0, 1.0),
        holding("temperature [°C]", 1, 10.0),
    ],
};
