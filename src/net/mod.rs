//! Network side: wire protocol and the bridge service.

pub mod service;
pub mod wire;

pub use service::{NetOptions, NetService};
pub use wire::{FRAME_LEN, Message};
