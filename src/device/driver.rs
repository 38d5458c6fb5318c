//! Driver trait consumed by the device controller.
//!
//! The rover exposes two logically independent channels: a command channel
//! (wheel state reads, speed/stop writes) and a distance event channel.
//! The controller serializes command-channel access under its device lock;
//! the distance channel is handed out as a separate [`DistanceSource`] so a
//! blocking distance read never stalls command traffic.

use crate::error::Result;

/// Wheel state snapshot as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelState {
    pub left: i16,
    pub right: i16,
    pub max: i16,
    pub min: i16,
}

/// Blocking reader for device-originated distance samples.
///
/// `read_distance` blocks at the device's own cadence until a sample is
/// available and returns it in centimeters.
pub trait DistanceSource: Send {
    fn read_distance(&mut self) -> Result<u32>;
}

/// Command-channel contract of the rover driver.
///
/// Every call returns a success/failure outcome; the controller treats any
/// failure as fatal. `release` must be called at most once per handle; the
/// controller guards against double release.
pub trait RoverDriver: Send {
    /// Initialize the device. Fails if the handle is already initialized.
    fn init(&mut self) -> Result<()>;

    /// Release the device handle.
    fn release(&mut self) -> Result<()>;

    /// Read the current wheel state.
    fn state(&mut self) -> Result<WheelState>;

    /// Set both wheel speeds.
    fn set_speed(&mut self, left: i16, right: i16) -> Result<()>;

    /// Zero both wheels.
    fn stop(&mut self) -> Result<()>;

    /// Open an independent handle onto the distance event channel.
    ///
    /// Must be called after `init`. The returned source shares the device
    /// but not the command channel, so reads on it need no device lock.
    fn distance_source(&mut self) -> Result<Box<dyn DistanceSource>>;
}
