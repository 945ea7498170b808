mod address_discovery;

pub(crate) use address_discovery::AddressDiscovery;
pub use address_discovery::scan_candidates;
