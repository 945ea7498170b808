use crate::address::SlaveAddress;
use crate::bus::{BaudRate, BusProtocol, Parity};

/// A named set of serial settings a sensor is known to ship or be deployed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusPreset {
    pub name: &'static str,
    pub baudrate: BaudRate,
    pub parity: Parity,
    /// Address the sensor answers to under this preset, when fixed
    pub slave_address: Option<SlaveAddress>,
}

/// One conductor of a sensor cable.
///
/// Up to three colour bands, each with an optional marking; unused bands
/// repeat the last colour and carry an empty marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wire {
    /// Terminal the conductor goes to, e.g. `V+` or `RS485A`
    pub label: &'static str,
    pub colors: [&'static str; 3],
    pub text: [&'static str; 3],
}

impl Wire {
    pub const fn solid(label: &'static str, color: &'static str) -> Self {
        Self {
            label,
            colors: [color; 3],
            text: [""; 3],
        }
    }

    pub const fn banded(
        label: &'static str,
        colors: [&'static str; 3],
        text: [&'static str; 3],
    ) -> Self {
        Self {
            label,
            colors,
            text,
        }
    }

    /// Non-empty markings joined with spaces
    pub fn marking(&self) -> String {
        self.text
            .iter()
            .filter(|t| !t.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Display for Wire {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [first, second, third] = self.colors;
        if first == second && second == third {
            write!(f, "{}: {first}", self.label)?;
        } else {
            write!(f, "{}: {first}/{second}/{third}", self.label)?;
        }
        let marking = self.marking();
        if !marking.is_empty() {
            write!(f, " ({marking})")?;
        }
        Ok(())
    }
}

/// Static description of a sensor model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorModel {
    pub name: &'static str,
    pub protocol: BusProtocol,
    /// First entry is the default preset
    pub presets: &'static [BusPreset],
    pub needs_power_cycle_before_setup: bool,
    pub can_broadcast_read: bool,
    pub can_broadcast_setup: bool,
    /// Cable colours, in terminal order
    pub wires: &'static [Wire],
}

impl SensorModel {
    pub fn preset(&self, name: &str) -> Option<&BusPreset> {
        self.presets.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn default_preset(&self) -> Option<&BusPreset> {
        self.presets.first()
    }

    /// Baudrate and parity to open the port with when the caller gives none
    pub fn default_line(&self) -> (BaudRate, Parity) {
        self.default_preset()
            .map(|p| (p.baudrate, p.parity))
            .unwrap_or_else(|| self.protocol.default_line())
    }
}
