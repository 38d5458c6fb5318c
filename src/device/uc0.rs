//! Thin binding to the uc0 rover kernel driver.
//!
//! The driver exposes two files: a command char device whose `read` yields
//! the wheel-state record and whose `ioctl`s set wheel speed, and an
//! input-event file that delivers distance samples as `EV_MSC`/`MSC_RAW`
//! events. Each call maps to exactly one kernel operation; all policy
//! (locking, coalescing, retries) lives in the controller.

use crate::device::driver::{DistanceSource, RoverDriver, WheelState};
use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::io::AsRawFd;

// Linux ioctl number encoding (asm-generic/ioctl.h).
const IOC_WRITE: libc::c_ulong = 1;
const IOC_NRSHIFT: libc::c_ulong = 0;
const IOC_TYPESHIFT: libc::c_ulong = 8;
const IOC_SIZESHIFT: libc::c_ulong = 16;
const IOC_DIRSHIFT: libc::c_ulong = 30;

const fn ioc(dir: libc::c_ulong, ty: u8, nr: u8, size: usize) -> libc::c_ulong {
    (dir << IOC_DIRSHIFT)
        | ((ty as libc::c_ulong) << IOC_TYPESHIFT)
        | ((nr as libc::c_ulong) << IOC_NRSHIFT)
        | ((size as libc::c_ulong) << IOC_SIZESHIFT)
}

/// uc0 ioctl magic and requests.
const UC0_IOC_MAGIC: u8 = b'u';
const UC0_IOC_SET_SPEED: libc::c_ulong = ioc(IOC_WRITE, UC0_IOC_MAGIC, 1, 4);
const UC0_IOC_STOP: libc::c_ulong = ioc(IOC_WRITE, UC0_IOC_MAGIC, 2, 0);

// linux/input.h event codes used by the distance channel.
const EV_MSC: u16 = 0x04;
const MSC_RAW: u16 = 0x03;

/// Raw `struct input_event` as read from the event file.
#[repr(C)]
#[derive(Clone, Copy)]
struct InputEvent {
    _time: libc::timeval,
    kind: u16,
    code: u16,
    value: i32,
}

const INPUT_EVENT_SIZE: usize = std::mem::size_of::<InputEvent>();

/// Handle onto the uc0 command and event device files.
pub struct Uc0Driver {
    dev_path: String,
    event_path: String,
    dev_file: Option<File>,
    event_path_open: bool,
}

impl Uc0Driver {
    pub fn new(dev_path: &str, event_path: &str) -> Self {
        Self {
            dev_path: dev_path.to_string(),
            event_path: event_path.to_string(),
            dev_file: None,
            event_path_open: false,
        }
    }

    fn dev_file(&mut self) -> Result<&mut File> {
        self.dev_file.as_mut().ok_or(Error::NotInitialized)
    }

    fn send_ioctl(&mut self, request: libc::c_ulong, args: &[i16; 2]) -> Result<()> {
        let fd = self.dev_file()?.as_raw_fd();
        // Safety: fd is a valid open descriptor and args outlives the call.
        let ret = unsafe { libc::ioctl(fd, request as _, args.as_ptr()) };
        if ret == -1 {
            return Err(Error::Device(format!(
                "ioctl {request:#x} failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }
}

impl RoverDriver for Uc0Driver {
    fn init(&mut self) -> Result<()> {
        if self.dev_file.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let dev_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.dev_path)
            .map_err(|e| {
                Error::InitializationFailed(format!("open {}: {e}", self.dev_path))
            })?;

        // Probe the event file now so a missing distance channel fails the
        // startup instead of the first distance request.
        File::open(&self.event_path).map_err(|e| {
            Error::InitializationFailed(format!("open {}: {e}", self.event_path))
        })?;

        self.dev_file = Some(dev_file);
        self.event_path_open = true;
        log::info!(
            "uc0: device initialized ({}, events {})",
            self.dev_path,
            self.event_path
        );
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.dev_file = None;
        self.event_path_open = false;
        log::info!("uc0: device released");
        Ok(())
    }

    fn state(&mut self) -> Result<WheelState> {
        let file = self.dev_file()?;
        file.seek(SeekFrom::Start(0))?;

        // Kernel record: four native-endian i16 fields.
        let mut buf = [0u8; 8];
        file.read_exact(&mut buf)?;
        let field = |off: usize| i16::from_ne_bytes([buf[off], buf[off + 1]]);
        Ok(WheelState {
            left: field(0),
            right: field(2),
            max: field(4),
            min: field(6),
        })
    }

    fn set_speed(&mut self, left: i16, right: i16) -> Result<()> {
        self.send_ioctl(UC0_IOC_SET_SPEED, &[left, right])
    }

    fn stop(&mut self) -> Result<()> {
        self.send_ioctl(UC0_IOC_STOP, &[0, 0])
    }

    fn distance_source(&mut self) -> Result<Box<dyn DistanceSource>> {
        if !self.event_path_open {
            return Err(Error::NotInitialized);
        }
        let event_file = File::open(&self.event_path)?;
        Ok(Box::new(Uc0DistanceSource { event_file }))
    }
}

/// Independent handle onto the distance event file.
struct Uc0DistanceSource {
    event_file: File,
}

impl DistanceSource for Uc0DistanceSource {
    fn read_distance(&mut self) -> Result<u32> {
        // The event stream may interleave sync and key events; skip until a
        // raw measurement arrives.
        loop {
            let mut buf = [0u8; INPUT_EVENT_SIZE];
            self.event_file.read_exact(&mut buf)?;
            // Safety: buf is exactly one packed input_event record.
            let event: InputEvent = unsafe { std::ptr::read_unaligned(buf.as_ptr().cast()) };
            if event.kind == EV_MSC && event.code == MSC_RAW {
                return Ok(event.value.max(0) as u32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ioctl_numbers_are_stable() {
        // dir=write(1), size 4, type 'u', nr 1
        assert_eq!(UC0_IOC_SET_SPEED, (1 << 30) | (4 << 16) | (0x75 << 8) | 1);
        assert_eq!(UC0_IOC_STOP, (1 << 30) | (0x75 << 8) | 2);
    }

    #[test]
    fn uninitialized_handle_rejects_commands() {
        let mut driver = Uc0Driver::new("/nonexistent/uc0", "/nonexistent/event0");
        assert!(matches!(driver.state(), Err(Error::NotInitialized)));
        assert!(matches!(driver.stop(), Err(Error::NotInitialized)));
        assert!(matches!(
            driver.distance_source(),
            Err(Error::NotInitialized)
        ));
    }

    #[test]
    fn init_fails_loudly_on_missing_device() {
        let mut driver = Uc0Driver::new("/nonexistent/uc0", "/nonexistent/event0");
        assert!(matches!(
            driver.init(),
            Err(Error::InitializationFailed(_))
        ));
    }
}
