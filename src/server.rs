//! Supervisor wiring the device controller and the network bridge.
//!
//! One queue per direction: network -> controller (commands) and
//! controller -> network (responses). Neither side ever calls into the
//! other's threads; everything crosses through the queues plus the
//! video-status query contract.

use crate::config::Config;
use crate::device::{DeviceController, create_driver};
use crate::error::Result;
use crate::net::{NetOptions, NetService};
use crate::queue::BlockingQueue;
use crate::video::VideoStreamStatus;
use std::sync::Arc;
use std::time::Duration;

pub struct Server {
    controller: DeviceController,
    net: NetService,
    video: Arc<VideoStreamStatus>,
}

impl Server {
    /// Bring up the whole daemon: video status, device side, network side.
    ///
    /// Any startup failure (device allocation/init, socket bind) propagates
    /// to the caller; partial startups are unwound.
    pub fn start(config: &Config) -> Result<Self> {
        let in_queue = Arc::new(BlockingQueue::new());
        let out_queue = Arc::new(BlockingQueue::new());

        let video = Arc::new(VideoStreamStatus::new(config.video.port));
        video.start();

        let driver = create_driver(&config.device)?;
        let mut controller = DeviceController::start(
            driver,
            Arc::clone(&in_queue),
            Arc::clone(&out_queue),
            Duration::from_millis(config.device.dispatch_interval_ms),
        )?;

        let options = NetOptions {
            bind_address: config.network.bind_address.clone(),
            broadcast_address: config.network.broadcast_address.clone(),
            broadcast_interval: Duration::from_millis(config.network.broadcast_interval_ms),
        };
        let net = match NetService::start(in_queue, out_queue, Arc::clone(&video), options) {
            Ok(net) => net,
            Err(e) => {
                controller.stop();
                video.stop();
                return Err(e);
            }
        };

        log::info!("server: all services running");
        Ok(Self {
            controller,
            net,
            video,
        })
    }

    /// Orderly shutdown: network first so no new commands arrive, then the
    /// controller (which releases the device), then the video status.
    pub fn stop(&mut self) {
        self.net.stop();
        self.controller.stop();
        self.video.stop();
        log::info!("server: stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceConfig, LoggingConfig, NetworkConfig, VideoConfig};
    use crate::net::wire::{FRAME_LEN, Message};
    use std::io::{Read, Write};
    use std::net::{TcpStream, UdpSocket};

    fn test_config(broadcast_address: String) -> Config {
        Config {
            device: DeviceConfig {
                kind: "mock".to_string(),
                dev_path: String::new(),
                event_path: String::new(),
                dispatch_interval_ms: 5,
            },
            network: NetworkConfig {
                bind_address: "127.0.0.1:0".to_string(),
                broadcast_address,
                broadcast_interval_ms: 50,
            },
            video: VideoConfig { port: 1234 },
            logging: LoggingConfig {
                level: "debug".to_string(),
            },
        }
    }

    #[test]
    fn end_to_end_wheels_state_query() {
        let udp_sink = UdpSocket::bind("127.0.0.1:0").unwrap();
        let config = test_config(udp_sink.local_addr().unwrap().to_string());

        let mut server = Server::start(&config).unwrap();

        let mut client = TcpStream::connect(server.net.local_addr()).unwrap();
        client
            .write_all(&Message::RequestWheelsState.encode())
            .unwrap();

        let mut frame = [0u8; FRAME_LEN];
        client.read_exact(&mut frame).unwrap();
        assert_eq!(
            Message::decode(&frame),
            Message::WheelsState {
                left: 0,
                right: 0,
                max: 255,
                min: -255,
            }
        );

        server.stop();
    }

    #[test]
    fn unknown_device_kind_fails_startup() {
        let mut config = test_config("127.0.0.1:1".to_string());
        config.device.kind = "warp-drive".to_string();
        assert!(Server::start(&config).is_err());
    }
}
