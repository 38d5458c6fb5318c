//! Device side: driver contract, concrete drivers and the controller.

pub mod controller;
pub mod driver;
pub mod mock;
pub mod uc0;

pub use controller::DeviceController;
pub use driver::{DistanceSource, RoverDriver, WheelState};

use crate::config::DeviceConfig;
use crate::error::{Error, Result};

/// Build the driver named by the config.
pub fn create_driver(config: &DeviceConfig) -> Result<Box<dyn RoverDriver>> {
    match config.kind.as_str() {
        "uc0" => Ok(Box::new(uc0::Uc0Driver::new(
            &config.dev_path,
            &config.event_path,
        ))),
        "mock" => Ok(Box::new(mock::MockDriver::new())),
        other => Err(Error::UnknownDeviceKind(other.to_string())),
    }
}
