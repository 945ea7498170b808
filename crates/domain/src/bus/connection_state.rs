use serde::{Deserialize, Serialize};

/// Lifecycle state of the (single) connection to the sensor bus
///
/// ```text
/// Disconnected --connect--> Connecting --address known--> Connected
///      ^                        |                             |
///      |                        | not found / reboot needed   | disconnect / transport failure
///      |                        v                             v
///      +-------------------- Disconnecting <------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    /// No session, no workers
    #[default]
    Disconnected,
    /// Port open, slave address being discovered
    Connecting,
    /// Port open and a device answers at the current address
    Connected,
    /// Workers cancelled, waiting for them and for the port to close
    Disconnecting,
}

impl ConnectionState {
    /// Check if state allows connection attempt
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Check if there is anything to tear down
    pub fn can_disconnect(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// Check if currently connected
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }

    /// Transition to connecting state
    pub fn to_connecting(&self) -> Result<Self, &'static str> {
        match self {
            Self::Disconnected => Ok(Self::Connecting),
            _ => Err("Can only connect from Disconnected state"),
        }
    }

    /// Transition to connected state
    pub fn to_connected(&self) -> Result<Self, &'static str> {
        match self {
            Self::Connecting => Ok(Self::Connected),
            _ => Err("Can only complete connection from Connecting state"),
        }
    }

    /// Transition to disconnecting state
    pub fn to_disconnecting(&self) -> Result<Self, &'static str> {
        match self {
            Self::Connecting | Self::Connected => Ok(Self::Disconnecting),
            _ => Err("Can only disconnect from Connecting or Connected state"),
        }
    }

    /// Transition to disconnected state
    pub fn to_disconnected(&self) -> Self {
        Self::Disconnected
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnecting => "Disconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
