//! Mock rover driver for hardware-free runs and tests.
//!
//! Mirrors the shape of the real uc0 binding: a command channel holding
//! wheel state and a distance channel producing samples at a fixed cadence.
//! All driver calls are recorded so tests can assert on exactly what
//! reached the "hardware".

use crate::device::driver::{DistanceSource, RoverDriver, WheelState};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Driver calls observable by tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCall {
    SetSpeed { left: i16, right: i16 },
    Stop,
}

#[derive(Debug)]
struct MockState {
    initialized: bool,
    wheels: WheelState,
    calls: Vec<DriverCall>,
    releases: u32,
}

/// Simulated rover device.
#[derive(Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
    /// Cadence of simulated distance samples; tests use zero.
    distance_interval: Duration,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::with_distance_interval(Duration::from_millis(100))
    }

    /// Create a mock with a custom distance cadence (zero for tests).
    pub fn with_distance_interval(distance_interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                initialized: false,
                wheels: WheelState {
                    left: 0,
                    right: 0,
                    max: 255,
                    min: -255,
                },
                calls: Vec::new(),
                releases: 0,
            })),
            distance_interval,
        }
    }

    /// Preset the wheel state the mock reports.
    pub fn set_state(&self, wheels: WheelState) {
        self.state.lock().wheels = wheels;
    }

    /// Calls issued against the mock so far, in order.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// How many times `release` was called on this handle.
    pub fn release_count(&self) -> u32 {
        self.state.lock().releases
    }

    fn check_initialized(state: &MockState) -> Result<()> {
        if state.initialized {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RoverDriver for MockDriver {
    fn init(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.initialized {
            return Err(Error::AlreadyInitialized);
        }
        state.initialized = true;
        log::debug!("mock: device initialized");
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.initialized = false;
        state.releases += 1;
        log::debug!("mock: device released");
        Ok(())
    }

    fn state(&mut self) -> Result<WheelState> {
        let state = self.state.lock();
        Self::check_initialized(&state)?;
        Ok(state.wheels)
    }

    fn set_speed(&mut self, left: i16, right: i16) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_initialized(&state)?;
        state.wheels.left = left;
        state.wheels.right = right;
        state.calls.push(DriverCall::SetSpeed { left, right });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_initialized(&state)?;
        state.wheels.left = 0;
        state.wheels.right = 0;
        state.calls.push(DriverCall::Stop);
        Ok(())
    }

    fn distance_source(&mut self) -> Result<Box<dyn DistanceSource>> {
        Self::check_initialized(&self.state.lock())?;
        Ok(Box::new(MockDistanceSource {
            interval: self.distance_interval,
            near: false,
            reads: 0,
        }))
    }
}

/// Alternates between a far and a near obstacle every 100 samples, with a
/// little jitter so the stream looks alive.
struct MockDistanceSource {
    interval: Duration,
    near: bool,
    reads: u32,
}

impl DistanceSource for MockDistanceSource {
    fn read_distance(&mut self) -> Result<u32> {
        if !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }
        if self.reads == 100 {
            self.reads = 0;
            self.near = !self.near;
        }
        self.reads += 1;

        let base: u32 = if self.near { 10 } else { 50 };
        Ok(base + rand::thread_rng().gen_range(0..3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_not_idempotent() {
        let mut driver = MockDriver::new();
        driver.init().unwrap();
        assert!(matches!(driver.init(), Err(Error::AlreadyInitialized)));
    }

    #[test]
    fn calls_are_recorded_in_order() {
        let mut driver = MockDriver::new();
        driver.init().unwrap();
        driver.set_speed(10, -10).unwrap();
        driver.stop().unwrap();
        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::SetSpeed {
                    left: 10,
                    right: -10
                },
                DriverCall::Stop,
            ]
        );
    }

    #[test]
    fn uninitialized_device_rejects_commands() {
        let mut driver = MockDriver::new();
        assert!(driver.set_speed(1, 1).is_err());
        assert!(driver.state().is_err());
        assert!(driver.distance_source().is_err());
    }

    #[test]
    fn distance_samples_track_the_simulated_obstacle() {
        let mut driver = MockDriver::with_distance_interval(Duration::ZERO);
        driver.init().unwrap();
        let mut source = driver.distance_source().unwrap();
        let cm = source.read_distance().unwrap();
        assert!((50..=52).contains(&cm));
    }
}
