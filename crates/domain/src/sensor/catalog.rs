use std::collections::HashMap;
use std::sync::Arc;

use super::driver::SensorDriver;
use crate::bus::BusProtocol;
use crate::error::{DomainError, Result};

/// Builds a fresh driver instance
pub type SensorConstructor = fn() -> Arc<dyn SensorDriver>;

struct Entry {
    name: &'static str,
    protocol: BusProtocol,
    constructor: SensorConstructor,
}

/// Immutable name -> driver registry, assembled once at startup
pub struct SensorCatalog {
    entries: Vec<Entry>,
    index: HashMap<&'static str, usize>,
}

impl SensorCatalog {
    pub fn builder() -> SensorCatalogBuilder {
        SensorCatalogBuilder::default()
    }

    /// Instantiate the driver registered under `name`
    pub fn create(&self, name: &str) -> Result<Arc<dyn SensorDriver>> {
        self.entry(name).map(|e| (e.constructor)())
    }

    pub fn protocol_of(&self, name: &str) -> Result<BusProtocol> {
        self.entry(name).map(|e| e.protocol)
    }

    /// Names in registration order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name)
    }

    pub fn by_protocol(&self, protocol: BusProtocol) -> impl Iterator<Item = &'static str> + '_ {
        self.entries
            .iter()
            .filter(move |e| e.protocol == protocol)
            .map(|e| e.name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Result<&Entry> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| DomainError::UnknownSensor(name.to_string()))
    }
}

#[derive(Default)]
pub struct SensorCatalogBuilder {
    entries: Vec<Entry>,
}

impl SensorCatalogBuilder {
    /// Register a model; its name and bus come from the driver's own model
    pub fn register(mut self, constructor: SensorConstructor) -> Self {
        let model = *constructor().model();
        self.entries.push(Entry {
            name: model.name,
            protocol: model.protocol,
            constructor,
        });
        self
    }

    pub fn build(self) -> Result<SensorCatalog> {
        let mut index = HashMap::with_capacity(self.entries.len());
        for (i, entry) in self.entries.iter().enumerate() {
            if index.insert(entry.name, i).is_some() {
                return Err(DomainError::InvalidConfiguration(format!(
                    "sensor {} registered twice",
                    entry.name
                )));
            }
        }
        Ok(SensorCatalog {
            entries: self.entries,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::address::SlaveAddress;
    use crate::bus::BusLink;
    use crate::error::DriverError;
    use crate::sensor::{ConfigureOptions, Reading, SensorModel};

    struct Fixed(SensorModel);

    #[async_trait]
    impl SensorDriver for Fixed {
        fn model(&self) -> &SensorModel {
            &self.0
        }

        async fn probe(&self, _: &dyn BusLink, _: SlaveAddress) -> std::result::Result<bool, DriverError> {
            Ok(true)
        }

        async fn read(&self, _: &dyn BusLink, _: SlaveAddress) -> std::result::Result<Reading, DriverError> {
            Ok(Reading::new())
        }

        async fn configure(
            &self,
            _: &dyn BusLink,
            _: SlaveAddress,
            _: SlaveAddress,
            _: &ConfigureOptions,
        ) -> std::result::Result<(), DriverError> {
            Ok(())
        }
    }

    fn model(name: &'static str, protocol: BusProtocol) -> SensorModel {
        SensorModel {
            name,
            protocol,
            presets: &[],
            needs_power_cycle_before_setup: false,
            can_broadcast_read: false,
            can_broadcast_setup: false,
            wires: &[],
        }
    }

    fn par() -> Arc<dyn SensorDriver> {
        Arc::new(Fixed(model("PAR", BusProtocol::RegisterBus)))
    }

    fn frost() -> Arc<dyn SensorDriver> {
        Arc::new(Fixed(model("Frost", BusProtocol::AsciiBus)))
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = SensorCatalog::builder()
            .register(par)
            .register(frost)
            .build()
            .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.names().collect::<Vec<_>>(), ["PAR", "Frost"]);
        assert_eq!(catalog.create("Frost").unwrap().model().name, "Frost");
        assert_eq!(catalog.protocol_of("PAR").unwrap(), BusProtocol::RegisterBus);
        assert_eq!(
            catalog.by_protocol(BusProtocol::AsciiBus).collect::<Vec<_>>(),
            ["Frost"]
        );
    }

    #[test]
    fn test_unknown_sensor() {
        let catalog = SensorCatalog::builder().register(par).build().unwrap();
        assert!(matches!(
            catalog.create("Nope"),
            Err(DomainError::UnknownSensor(name)) if name == "Nope"
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let result = SensorCatalog::builder().register(par).register(par).build();
        assert!(matches!(result, Err(DomainError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_create_returns_fresh_instances() {
        let catalog = SensorCatalog::builder().register(par).build().unwrap();
        let a = catalog.create("PAR").unwrap();
        let b = catalog.create("PAR").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
