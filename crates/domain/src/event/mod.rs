use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod observer;
pub use observer::SessionObserver;

use crate::address::SlaveAddress;
use crate::bus::{BusProtocol, ConnectionState, Parity};
use crate::sensor::Reading;

/// Identifies one open session; events from a torn-down session keep its id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a scan stopped before reaching a verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum CancelReason {
    /// Cancel flag set by the caller
    Requested,
    /// Handle cleared by a concurrent disconnect
    HandleLost,
    /// Transport failed mid-scan
    Transport(String),
}

/// Events emitted by sessions and their workers, in emission order per worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SessionEvent {
    SessionConnected {
        session_id: SessionId,
        port: String,
        protocol: BusProtocol,
        baudrate: u32,
        parity: Parity,
        timestamp: DateTime<Utc>,
    },

    SessionConnectFailed {
        port: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    SessionDisconnected {
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },

    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
        timestamp: DateTime<Utc>,
    },

    VerifyingCurrentId {
        session_id: SessionId,
        address: SlaveAddress,
        timestamp: DateTime<Utc>,
    },

    CurrentIdValid {
        session_id: SessionId,
        address: SlaveAddress,
        timestamp: DateTime<Utc>,
    },

    SlaveIdInvalid {
        session_id: SessionId,
        address: SlaveAddress,
        timestamp: DateTime<Utc>,
    },

    Scanning {
        session_id: SessionId,
        address: SlaveAddress,
        timestamp: DateTime<Utc>,
    },

    AddressFound {
        session_id: SessionId,
        address: SlaveAddress,
        timestamp: DateTime<Utc>,
    },

    ScanExhausted {
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },

    ScanCancelled {
        session_id: SessionId,
        reason: CancelReason,
        timestamp: DateTime<Utc>,
    },

    RebootRequired {
        session_id: SessionId,
        address: SlaveAddress,
        timestamp: DateTime<Utc>,
    },

    SensorConfigured {
        session_id: SessionId,
        previous: SlaveAddress,
        address: SlaveAddress,
        timestamp: DateTime<Utc>,
    },

    TestSuccess {
        session_id: SessionId,
        address: SlaveAddress,
        reading: Reading,
        timestamp: DateTime<Utc>,
    },

    TestFailure {
        session_id: SessionId,
        address: Option<SlaveAddress>,
        error: String,
        /// Transport-class failure; the lifecycle manager tears the session down
        transport: bool,
        timestamp: DateTime<Utc>,
    },

    TestCancelled {
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    pub fn session_connected(
        session_id: SessionId,
        port: impl Into<String>,
        protocol: BusProtocol,
        baudrate: u32,
        parity: Parity,
    ) -> Self {
        Self::SessionConnected {
            session_id,
            port: port.into(),
            protocol,
            baudrate,
            parity,
            timestamp: Utc::now(),
        }
    }

    pub fn session_connect_failed(port: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SessionConnectFailed {
            port: port.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn session_disconnected(session_id: SessionId) -> Self {
        Self::SessionDisconnected {
            session_id,
            timestamp: Utc::now(),
        }
    }

    pub fn state_changed(from: ConnectionState, to: ConnectionState) -> Self {
        Self::StateChanged {
            from,
            to,
            timestamp: Utc::now(),
        }
    }

    pub fn verifying_current_id(session_id: SessionId, address: SlaveAddress) -> Self {
        Self::VerifyingCurrentId {
            session_id,
            address,
            timestamp: Utc::now(),
        }
    }

    pub fn current_id_valid(session_id: SessionId, address: SlaveAddress) -> Self {
        Self::CurrentIdValid {
            session_id,
            address,
            timestamp: Utc::now(),
        }
    }

    pub fn slave_id_invalid(session_id: SessionId, address: SlaveAddress) -> Self {
        Self::SlaveIdInvalid {
            session_id,
            address,
            timestamp: Utc::now(),
        }
    }

    pub fn scanning(session_id: SessionId, address: SlaveAddress) -> Self {
        Self::Scanning {
            session_id,
            address,
            timestamp: Utc::now(),
        }
    }

    pub fn address_found(session_id: SessionId, address: SlaveAddress) -> Self {
        Self::AddressFound {
            session_id,
            address,
            timestamp: Utc::now(),
        }
    }

    pub fn scan_exhausted(session_id: SessionId) -> Self {
        Self::ScanExhausted {
            session_id,
            timestamp: Utc::now(),
        }
    }

    pub fn scan_cancelled(session_id: SessionId, reason: CancelReason) -> Self {
        Self::ScanCancelled {
            session_id,
            reason,
            timestamp: Utc::now(),
        }
    }

    pub fn reboot_required(session_id: SessionId, address: SlaveAddress) -> Self {
        Self::RebootRequired {
            session_id,
            address,
            timestamp: Utc::now(),
        }
    }

    pub fn sensor_configured(
        session_id: SessionId,
        previous: SlaveAddress,
        address: SlaveAddress,
    ) -> Self {
        Self::SensorConfigured {
            session_id,
            previous,
            address,
            timestamp: Utc::now(),
        }
    }

    pub fn test_success(session_id: SessionId, address: SlaveAddress, reading: Reading) -> Self {
        Self::TestSuccess {
            session_id,
            address,
            reading,
            timestamp: Utc::now(),
        }
    }

    pub fn test_failure(
        session_id: SessionId,
        address: Option<SlaveAddress>,
        error: impl Into<String>,
        transport: bool,
    ) -> Self {
        Self::TestFailure {
            session_id,
            address,
            error: error.into(),
            transport,
            timestamp: Utc::now(),
        }
    }

    pub fn test_cancelled(session_id: SessionId) -> Self {
        Self::TestCancelled {
            session_id,
            timestamp: Utc::now(),
        }
    }

    /// The event's kind tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionConnected { .. } => "SessionConnected",
            Self::SessionConnectFailed { .. } => "SessionConnectFailed",
            Self::SessionDisconnected { .. } => "SessionDisconnected",
            Self::StateChanged { .. } => "StateChanged",
            Self::VerifyingCurrentId { .. } => "VerifyingCurrentId",
            Self::CurrentIdValid { .. } => "CurrentIdValid",
            Self::SlaveIdInvalid { .. } => "SlaveIdInvalid",
            Self::Scanning { .. } => "Scanning",
            Self::AddressFound { .. } => "AddressFound",
            Self::ScanExhausted { .. } => "ScanExhausted",
            Self::ScanCancelled { .. } => "ScanCancelled",
            Self::RebootRequired { .. } => "RebootRequired",
            Self::SensorConfigured { .. } => "SensorConfigured",
            Self::TestSuccess { .. } => "TestSuccess",
            Self::TestFailure { .. } => "TestFailure",
            Self::TestCancelled { .. } => "TestCancelled",
        }
    }

    /// Session that produced the event, if any
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::SessionConnectFailed { .. } | Self::StateChanged { .. } => None,
            Self::SessionConnected { session_id, .. }
            | Self::SessionDisconnected { session_id, .. }
            | Self::VerifyingCurrentId { session_id, .. }
            | Self::CurrentIdValid { session_id, .. }
            | Self::SlaveIdInvalid { session_id, .. }
            | Self::Scanning { session_id, .. }
            | Self::AddressFound { session_id, .. }
            | Self::ScanExhausted { session_id, .. }
            | Self::ScanCancelled { session_id, .. }
            | Self::RebootRequired { session_id, .. }
            | Self::SensorConfigured { session_id, .. }
            | Self::TestSuccess { session_id, .. }
            | Self::TestFailure { session_id, .. }
            | Self::TestCancelled { session_id, .. } => Some(*session_id),
        }
    }

    /// Address the event is about, if any
    pub fn address(&self) -> Option<SlaveAddress> {
        match self {
            Self::VerifyingCurrentId { address, .. }
            | Self::CurrentIdValid { address, .. }
            | Self::SlaveIdInvalid { address, .. }
            | Self::Scanning { address, .. }
            | Self::AddressFound { address, .. }
            | Self::RebootRequired { address, .. }
            | Self::SensorConfigured { address, .. }
            | Self::TestSuccess { address, .. } => Some(*address),
            Self::TestFailure { address, .. } => *address,
            _ => None,
        }
    }

    /// Key/value payload, everything except the kind tag
    pub fn payload(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.remove("kind");
                map
            }
            _ => serde_json::Map::new(),
        }
    }
}
