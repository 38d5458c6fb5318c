//! Device controller: owns the rover driver and runs the three device-side
//! threads.
//!
//! - **intake**: drains the inbound queue. Wheel commands only overwrite the
//!   pending slot; a rapid burst coalesces to the newest command before the
//!   device ever sees one. State queries are answered synchronously,
//!   distance requests are flagged for the monitor thread so command
//!   latency never depends on the distance channel.
//! - **dispatch**: every `dispatch_interval` applies-and-clears the pending
//!   slot. The interval throttles traffic on the physical link regardless
//!   of how fast commands arrive; the device lock is held for a single
//!   device transaction, never across the sleep.
//! - **distance monitor**: waits on a condvar for a request, then reads one
//!   sample on the independent distance channel without holding the device
//!   lock, and pushes the response outbound.
//!
//! Any driver failure or protocol violation on these threads is fatal for
//! the whole process (see `error::fail_fast`).

use crate::device::driver::{DistanceSource, RoverDriver};
use crate::error::{Error, Result, fail_fast};
use crate::net::wire::Message;
use crate::queue::BlockingQueue;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const COMPONENT: &str = "device controller";

/// Driver handle plus the coalescing slot, guarded together: whoever holds
/// the device lock sees a consistent pending-vs-applied picture.
struct DeviceSlot {
    driver: Box<dyn RoverDriver>,
    pending: Message,
    released: bool,
}

struct ControllerInner {
    device: Mutex<DeviceSlot>,
    /// Latched distance request, separate monitor so flagging a request
    /// never contends with device I/O.
    distance_requested: Mutex<bool>,
    distance_cond: Condvar,
    running: AtomicBool,
    in_queue: Arc<BlockingQueue<Message>>,
    out_queue: Arc<BlockingQueue<Message>>,
}

impl ControllerInner {
    fn new(
        driver: Box<dyn RoverDriver>,
        in_queue: Arc<BlockingQueue<Message>>,
        out_queue: Arc<BlockingQueue<Message>>,
    ) -> Self {
        Self {
            device: Mutex::new(DeviceSlot {
                driver,
                pending: Message::Invalid,
                released: false,
            }),
            distance_requested: Mutex::new(false),
            distance_cond: Condvar::new(),
            running: AtomicBool::new(true),
            in_queue,
            out_queue,
        }
    }

    /// Process one inbound message. Only command and request tags are
    /// legal here; the network side already filtered peer garbage, so
    /// anything else means internal protocol corruption.
    fn handle_inbound(&self, msg: Message) -> Result<()> {
        match msg {
            Message::SetLeftWheelSpeed { .. }
            | Message::SetRightWheelSpeed { .. }
            | Message::SetWheelsSpeed { .. }
            | Message::Stop => {
                self.device.lock().pending = msg;
                Ok(())
            }
            Message::RequestWheelsState => {
                let state = {
                    let mut slot = self.device.lock();
                    slot.driver.state()
                }?;
                self.out_queue.enqueue(Message::WheelsState {
                    left: state.left,
                    right: state.right,
                    max: state.max,
                    min: state.min,
                });
                Ok(())
            }
            Message::RequestDistance => {
                *self.distance_requested.lock() = true;
                self.distance_cond.notify_one();
                Ok(())
            }
            other => Err(Error::UnsupportedMessage(other.tag())),
        }
    }

    /// Apply and clear the pending command, one device transaction under
    /// the device lock. Single-wheel commands merge with the live state so
    /// the untouched wheel keeps its speed.
    fn apply_pending(&self) -> Result<()> {
        let mut slot = self.device.lock();
        let pending = slot.pending;
        match pending {
            Message::Invalid => {}
            Message::SetLeftWheelSpeed { speed } => {
                let state = slot.driver.state()?;
                slot.driver.set_speed(speed, state.right)?;
            }
            Message::SetRightWheelSpeed { speed } => {
                let state = slot.driver.state()?;
                slot.driver.set_speed(state.left, speed)?;
            }
            Message::SetWheelsSpeed { left, right } => {
                slot.driver.set_speed(left, right)?;
            }
            Message::Stop => {
                slot.driver.stop()?;
            }
            other => return Err(Error::UnsupportedMessage(other.tag())),
        }
        slot.pending = Message::Invalid;
        Ok(())
    }

    /// Block until a distance request arrives or the controller stops.
    /// Returns false on shutdown. The monitor lock is released before the
    /// caller touches the device.
    fn wait_distance_request(&self) -> bool {
        let mut requested = self.distance_requested.lock();
        loop {
            if !self.running.load(Ordering::Relaxed) {
                return false;
            }
            if *requested {
                *requested = false;
                return true;
            }
            self.distance_cond.wait(&mut requested);
        }
    }

    fn release_device(&self) {
        let mut slot = self.device.lock();
        if slot.released {
            return;
        }
        slot.released = true;
        if let Err(e) = slot.driver.release() {
            log::error!("{COMPONENT}: device release failed: {e}");
        }
    }
}

fn run_intake(inner: &ControllerInner) -> Result<()> {
    while let Some(msg) = inner.in_queue.dequeue() {
        inner.handle_inbound(msg)?;
    }
    log::debug!("{COMPONENT}: intake thread exiting");
    Ok(())
}

fn run_dispatch(inner: &ControllerInner, interval: Duration) -> Result<()> {
    while inner.running.load(Ordering::Relaxed) {
        inner.apply_pending()?;
        thread::sleep(interval);
    }
    log::debug!("{COMPONENT}: dispatch thread exiting");
    Ok(())
}

fn run_distance_monitor(
    inner: &ControllerInner,
    source: &mut Box<dyn DistanceSource>,
) -> Result<()> {
    while inner.wait_distance_request() {
        let cm = source.read_distance()?;
        inner.out_queue.enqueue(Message::Distance { cm });
    }
    log::debug!("{COMPONENT}: distance monitor exiting");
    Ok(())
}

/// Device-side service. `start` initializes the driver and spawns the
/// three worker threads; `stop` unwinds them and releases the device.
pub struct DeviceController {
    inner: Arc<ControllerInner>,
    threads: Vec<JoinHandle<()>>,
}

impl DeviceController {
    /// Initialize the device and start the worker threads.
    ///
    /// Allocation or initialization failure propagates to the caller; a
    /// daemon without its device has nothing to serve.
    pub fn start(
        mut driver: Box<dyn RoverDriver>,
        in_queue: Arc<BlockingQueue<Message>>,
        out_queue: Arc<BlockingQueue<Message>>,
        dispatch_interval: Duration,
    ) -> Result<Self> {
        driver.init()?;
        let mut distance_source = driver.distance_source()?;

        let inner = Arc::new(ControllerInner::new(driver, in_queue, out_queue));
        let mut threads = Vec::with_capacity(3);

        let intake_inner = Arc::clone(&inner);
        threads.push(
            thread::Builder::new()
                .name("device-intake".to_string())
                .spawn(move || {
                    if let Err(e) = run_intake(&intake_inner) {
                        fail_fast(COMPONENT, &e);
                    }
                })?,
        );

        let dispatch_inner = Arc::clone(&inner);
        threads.push(
            thread::Builder::new()
                .name("device-dispatch".to_string())
                .spawn(move || {
                    if let Err(e) = run_dispatch(&dispatch_inner, dispatch_interval) {
                        fail_fast(COMPONENT, &e);
                    }
                })?,
        );

        let distance_inner = Arc::clone(&inner);
        threads.push(
            thread::Builder::new()
                .name("distance-monitor".to_string())
                .spawn(move || {
                    if let Err(e) = run_distance_monitor(&distance_inner, &mut distance_source) {
                        fail_fast(COMPONENT, &e);
                    }
                })?,
        );

        log::info!("{COMPONENT}: started");
        Ok(Self { inner, threads })
    }

    /// Stop all three threads, wait for them, then release the device.
    pub fn stop(&mut self) {
        self.inner.running.store(false, Ordering::Relaxed);
        self.inner.in_queue.close();
        // Taking the monitor lock orders the store above against the
        // monitor thread's check-then-wait, so the wakeup cannot be lost.
        drop(self.inner.distance_requested.lock());
        self.inner.distance_cond.notify_all();

        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                log::error!("{COMPONENT}: worker thread panicked");
            }
        }

        self.inner.release_device();
        log::info!("{COMPONENT}: stopped");
    }
}

impl Drop for DeviceController {
    fn drop(&mut self) {
        // Normally stop() already released the device; this is the
        // safeguard for teardown on an error path.
        self.inner.running.store(false, Ordering::Relaxed);
        self.inner.release_device();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{DriverCall, MockDriver};

    fn make_inner(mock: &MockDriver) -> (ControllerInner, Arc<BlockingQueue<Message>>) {
        let in_queue = Arc::new(BlockingQueue::new());
        let out_queue = Arc::new(BlockingQueue::new());
        let mut driver = Box::new(mock.clone());
        driver.init().unwrap();
        let inner = ControllerInner::new(driver, in_queue, Arc::clone(&out_queue));
        (inner, out_queue)
    }

    #[test]
    fn rapid_commands_coalesce_to_the_newest() {
        let mock = MockDriver::new();
        let (inner, _out) = make_inner(&mock);

        for speed in [10, 20, 30] {
            inner
                .handle_inbound(Message::SetWheelsSpeed {
                    left: speed,
                    right: speed,
                })
                .unwrap();
        }
        inner.apply_pending().unwrap();

        assert_eq!(
            mock.calls(),
            vec![DriverCall::SetSpeed {
                left: 30,
                right: 30
            }]
        );
    }

    #[test]
    fn pending_slot_clears_after_apply() {
        let mock = MockDriver::new();
        let (inner, _out) = make_inner(&mock);

        inner
            .handle_inbound(Message::SetWheelsSpeed { left: 5, right: 5 })
            .unwrap();
        inner.apply_pending().unwrap();
        inner.apply_pending().unwrap();

        // Second cycle was a no-op: nothing pending.
        assert_eq!(mock.calls().len(), 1);
    }

    #[test]
    fn single_wheel_command_preserves_the_other_wheel() {
        let mock = MockDriver::new();
        let (inner, _out) = make_inner(&mock);
        mock.set_state(crate::device::WheelState {
            left: 7,
            right: 9,
            max: 255,
            min: -255,
        });

        inner
            .handle_inbound(Message::SetLeftWheelSpeed { speed: 20 })
            .unwrap();
        inner.apply_pending().unwrap();

        assert_eq!(
            mock.calls(),
            vec![DriverCall::SetSpeed { left: 20, right: 9 }]
        );
    }

    #[test]
    fn wheels_state_request_round_trips_device_state() {
        let mock = MockDriver::new();
        let (inner, out_queue) = make_inner(&mock);
        mock.set_state(crate::device::WheelState {
            left: 5,
            right: -5,
            max: 255,
            min: -255,
        });

        inner.handle_inbound(Message::RequestWheelsState).unwrap();

        assert_eq!(
            out_queue.dequeue(),
            Some(Message::WheelsState {
                left: 5,
                right: -5,
                max: 255,
                min: -255,
            })
        );
    }

    #[test]
    fn distance_request_does_not_touch_the_device() {
        let mock = MockDriver::new();
        let (inner, _out) = make_inner(&mock);

        inner.handle_inbound(Message::RequestDistance).unwrap();

        assert!(mock.calls().is_empty());
        assert!(*inner.distance_requested.lock());
        // A stop queued right behind the distance request is unaffected.
        inner.handle_inbound(Message::Stop).unwrap();
        inner.apply_pending().unwrap();
        assert_eq!(mock.calls(), vec![DriverCall::Stop]);
    }

    #[test]
    fn response_tag_on_the_inbound_path_is_fatal() {
        let mock = MockDriver::new();
        let (inner, _out) = make_inner(&mock);

        let err = inner
            .handle_inbound(Message::WheelsState {
                left: 0,
                right: 0,
                max: 0,
                min: 0,
            })
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedMessage(0x21)));
    }

    #[test]
    fn controller_lifecycle_serves_distance_requests() {
        let mock = MockDriver::with_distance_interval(Duration::ZERO);
        let in_queue = Arc::new(BlockingQueue::new());
        let out_queue = Arc::new(BlockingQueue::new());

        let mut controller = DeviceController::start(
            Box::new(mock.clone()),
            Arc::clone(&in_queue),
            Arc::clone(&out_queue),
            Duration::from_millis(5),
        )
        .unwrap();

        in_queue.enqueue(Message::RequestDistance);
        match out_queue.dequeue() {
            Some(Message::Distance { .. }) => {}
            other => panic!("expected distance response, got {other:?}"),
        }

        controller.stop();
        assert!(!mock.is_initialized());
    }

    #[test]
    fn stop_releases_the_device_exactly_once() {
        let mock = MockDriver::with_distance_interval(Duration::ZERO);
        let in_queue = Arc::new(BlockingQueue::new());
        let out_queue = Arc::new(BlockingQueue::new());

        let mut controller = DeviceController::start(
            Box::new(mock.clone()),
            in_queue,
            out_queue,
            Duration::from_millis(5),
        )
        .unwrap();
        controller.stop();
        assert!(!mock.is_initialized());
        assert_eq!(mock.release_count(), 1);
        // Drop after stop must not release again (guarded).
        drop(controller);
        assert_eq!(mock.release_count(), 1);
    }
}
