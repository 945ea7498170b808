use std::time::Duration;

use domain::{DriverError, Parity, SerialSettings};
use tokio_serial::{SerialPortBuilder, SerialStream};

/// Windows needs the `\\.\` prefix to reliably open ports above COM9
fn native_port_name(port: &str) -> String {
    if cfg!(target_os = "windows") && !port.to_uppercase().starts_with(r"\\.\") {
        format!(r"\\.\{port}")
    } else {
        port.to_string()
    }
}

fn to_parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    }
}

fn to_stop_bits(stop_bits: u8) -> Result<tokio_serial::StopBits, DriverError> {
    match stop_bits {
        1 => Ok(tokio_serial::StopBits::One),
        2 => Ok(tokio_serial::StopBits::Two),
        _ => Err(DriverError::Unsupported(format!("{stop_bits} stop bits"))),
    }
}

fn to_data_bits(data_bits: u8) -> Result<tokio_serial::DataBits, DriverError> {
    match data_bits {
        5 => Ok(tokio_serial::DataBits::Five),
        6 => Ok(tokio_serial::DataBits::Six),
        7 => Ok(tokio_serial::DataBits::Seven),
        8 => Ok(tokio_serial::DataBits::Eight),
        _ => Err(DriverError::Unsupported(format!("{data_bits} data bits"))),
    }
}

pub(crate) fn port_builder(settings: &SerialSettings) -> Result<SerialPortBuilder, DriverError> {
    Ok(
        tokio_serial::new(native_port_name(&settings.port), settings.baudrate.as_u32())
            .data_bits(to_data_bits(settings.data_bits)?)
            .parity(to_parity(settings.parity))
            .stop_bits(to_stop_bits(settings.stop_bits)?)
            .timeout(Duration::from_millis(settings.timeout_ms)),
    )
}

pub(crate) fn open_stream(settings: &SerialSettings) -> Result<SerialStream, DriverError> {
    let builder = port_builder(settings)?;
    tracing::debug!(
        port = %settings.port,
        baudrate = %settings.baudrate,
        parity = %settings.parity,
        "Opening serial port"
    );
    SerialStream::open(&builder).map_err(|e| {
        tracing::warn!(port = %settings.port, error = %e, "Failed to open serial port");
        DriverError::Transport(format!(
            "Failed to open serial port {}: {}. Check that no other application holds it.",
            settings.port, e
        ))
    })
}

/// Sort an I/O failure on an open port.
///
/// Garbled bytes (bad checksum, broken framing, line noise) mean a device
/// answered badly, which is a protocol error. Everything else is the port.
pub(crate) fn classify_io(context: &str, e: &std::io::Error) -> DriverError {
    match e.kind() {
        std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
            DriverError::Protocol(format!("{context}: {e}"))
        }
        _ => DriverError::Transport(format!("{context}: {e}")),
    }
}
