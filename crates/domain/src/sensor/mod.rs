mod catalog;
mod driver;
mod model;
mod reading;

pub use catalog::{SensorCatalog, SensorCatalogBuilder, SensorConstructor};
pub use driver::{ConfigureOptions, SensorDriver};
pub use model::{BusPreset, SensorModel, Wire};
pub use reading::{Measurement, Reading};
