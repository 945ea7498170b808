//! Built-in sensor models

pub mod ascii;
pub mod register;

use std::sync::Arc;

use domain::{DomainError, SensorCatalog, SensorDriver};

pub use ascii::ApogeeRadiationFrost;
pub use register::{RegisterMap, RegisterSensor};

macro_rules! register_model {
    ($name:ident, $map:path) => {
        fn $name() -> Arc<dyn SensorDriver> {
            Arc::new(RegisterSensor::new(&$map))
        }
    };
}

register_model!(rika_par, register::RIKA_PAR);
register_model!(rika_th, register::RIKA_TH);
register_model!(apogee_par, register::APOGEE_PAR);
register_model!(apogee_ghi, register::APOGEE_GHI);
register_model!(seeed_leaf_wetness, register::SEEED_LEAF_WETNESS);
register_model!(seeed_th, register::SEEED_TH);
register_model!(campbell_soil_th, register::CAMPBELL_SOIL_TH);
register_model!(kipp_zonen_rt1, register::KIPP_ZONEN_RT1);

fn apogee_radiation_frost() -> Arc<dyn SensorDriver> {
    Arc::new(ApogeeRadiationFrost::new())
}

/// Catalog of every sensor this crate ships a driver for
pub fn builtin_catalog() -> Result<SensorCatalog, DomainError> {
    SensorCatalog::builder()
        .register(rika_par)
        .register(rika_th)
        .register(apogee_par)
        .register(apogee_ghi)
        .register(seeed_leaf_wetness)
        .register(seeed_th)
        .register(campbell_soil_th)
        .register(kipp_zonen_rt1)
        .register(apogee_radiation_frost)
        .build()
}
