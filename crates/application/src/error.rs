use thiserror::Error;

use domain::{ConnectError, ConnectionState, DomainError, DriverError};

/// Errors surfaced by session and lifecycle operations
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Cannot {action} while {from}")]
    InvalidTransition {
        from: ConnectionState,
        action: &'static str,
    },

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("No open session")]
    NotConnected,

    #[error("No current slave address; run discovery first")]
    NoAddress,

    #[error("No device answered on the bus")]
    NoDevice,

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error("Session busy: {0}")]
    Busy(&'static str),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
