use serde::{Deserialize, Serialize};

use crate::address::SlaveAddress;

/// Progress of one address discovery run
///
/// `Idle -> VerifyingCurrent -> (Found | Scanning) -> (Found | NotFound | Cancelled)`,
/// with `RebootRequired` short-circuiting out of verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "address")]
pub enum DiscoveryState {
    #[default]
    Idle,
    VerifyingCurrent,
    Scanning,
    Found(SlaveAddress),
    NotFound,
    Cancelled,
    RebootRequired,
}

impl DiscoveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Found(_) | Self::NotFound | Self::Cancelled | Self::RebootRequired
        )
    }

    pub fn found_address(&self) -> Option<SlaveAddress> {
        match self {
            Self::Found(address) => Some(*address),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!DiscoveryState::Idle.is_terminal());
        assert!(!DiscoveryState::VerifyingCurrent.is_terminal());
        assert!(!DiscoveryState::Scanning.is_terminal());
        assert!(DiscoveryState::Found(SlaveAddress::new(3)).is_terminal());
        assert!(DiscoveryState::NotFound.is_terminal());
        assert!(DiscoveryState::Cancelled.is_terminal());
        assert!(DiscoveryState::RebootRequired.is_terminal());
    }

    #[test]
    fn test_found_address() {
        assert_eq!(
            DiscoveryState::Found(SlaveAddress::new(42)).found_address(),
            Some(SlaveAddress::new(42))
        );
        assert_eq!(DiscoveryState::NotFound.found_address(), None);
    }
}
