//! Video stream status collaborator.
//!
//! Placeholder for the future video pipeline: the network bridge only ever
//! asks whether a stream is running and on which port. Both fields are
//! atomics so the accept thread can query without any lock of its own.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

pub struct VideoStreamStatus {
    running: AtomicBool,
    port: AtomicU16,
}

impl VideoStreamStatus {
    pub fn new(port: u16) -> Self {
        Self {
            running: AtomicBool::new(false),
            port: AtomicU16::new(port),
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::Relaxed);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_running_state_and_port() {
        let status = VideoStreamStatus::new(1234);
        assert!(!status.running());
        status.start();
        assert!(status.running());
        assert_eq!(status.port(), 1234);
        status.stop();
        assert!(!status.running());
    }
}
