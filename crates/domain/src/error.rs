use thiserror::Error;

/// Domain-level validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid slave address: {0}")]
    InvalidAddress(String),

    #[error("Invalid baudrate: {0}")]
    InvalidBaudRate(u32),

    #[error("Invalid parity: {0}")]
    InvalidParity(String),

    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;

/// Errors produced by a bus link or a sensor driver.
///
/// The split matters to discovery: transport errors end a scan, protocol
/// errors only mean "nobody valid answered at this address".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Port unreachable or OS-level I/O failure mid-operation
    #[error("Transport error: {0}")]
    Transport(String),

    /// Device answered with an exception, a malformed frame or a bad checksum
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Device did not answer in time
    #[error("No response within {0} ms")]
    Timeout(u64),

    /// The link was torn down by a concurrent disconnect
    #[error("Connection handle is gone")]
    NoHandle,

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl DriverError {
    /// Fatal to the operation in progress
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Lost a race with disconnect; callers treat this as a cancellation
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::NoHandle)
    }

    /// Recoverable: the device (or its absence) is to blame, not the bus
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_) | Self::Timeout(_) | Self::Unsupported(_)
        )
    }
}

/// Returned by a scoped handle acquisition after the handle was cleared.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Connection handle is no longer available")]
pub struct NoHandleError;

impl From<NoHandleError> for DriverError {
    fn from(_: NoHandleError) -> Self {
        Self::NoHandle
    }
}

/// Errors opening a session
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectError {
    #[error("Transport unavailable on {port}: {reason}")]
    TransportUnavailable { port: String, reason: String },
}
