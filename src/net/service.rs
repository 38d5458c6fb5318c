//! Network bridge: one TCP command client, UDP availability broadcast, and
//! outbound response delivery.
//!
//! Three threads share the connection slot under one lock:
//!
//! - **broadcast** advertises `DeviceAvailability` on UDP every few
//!   seconds; "available" means no client currently holds the rover. Send
//!   failures are logged and skipped — the broadcast is advertisement, not
//!   control, and is the only path here that tolerates I/O errors.
//! - **accept/intake** serves one client at a time: fixed-size frames are
//!   decoded and forwarded to the inbound queue; the video-port query is
//!   answered out-of-band straight onto the outbound queue; anything else
//!   from the peer is logged and dropped (the peer is untrusted, unlike
//!   the internal queues). EOF or a receive error ends the session, and a
//!   `Stop` is enqueued so the rover never keeps driving for a vanished
//!   operator.
//! - **outbound** drains the response queue. With no client connected the
//!   message is discarded: whatever state it carries is stale by the time
//!   the next client appears.
//!
//! No lock is held across network I/O; the outbound thread clones the
//! socket handle under the lock and writes outside it.

use crate::error::Result;
use crate::net::wire::{FRAME_LEN, Message};
use crate::queue::BlockingQueue;
use crate::video::VideoStreamStatus;
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const COMPONENT: &str = "net service";

/// Read timeout on the client socket; bounds how long shutdown waits for
/// the intake thread to notice the flag.
const CLIENT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Poll interval of the non-blocking accept loop.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Granularity of interruptible sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Network endpoints and cadence, taken from the `[network]` config section.
#[derive(Debug, Clone)]
pub struct NetOptions {
    pub bind_address: String,
    pub broadcast_address: String,
    pub broadcast_interval: Duration,
}

struct NetInner {
    in_queue: Arc<BlockingQueue<Message>>,
    out_queue: Arc<BlockingQueue<Message>>,
    video: Arc<VideoStreamStatus>,
    /// Current client, written by the accept thread, read by the other two.
    client: Mutex<Option<TcpStream>>,
    running: AtomicBool,
    options: NetOptions,
}

impl NetInner {
    /// Sleep `total` in slices so a stop request is honored promptly.
    fn interruptible_sleep(&self, total: Duration) {
        let mut remaining = total;
        while !remaining.is_zero() && self.running.load(Ordering::Relaxed) {
            let slice = remaining.min(SLEEP_SLICE);
            thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
    }

    /// Route one decoded frame from the peer.
    fn dispatch_frame(&self, frame: &[u8; FRAME_LEN]) {
        let msg = Message::decode(frame);
        match msg {
            Message::SetLeftWheelSpeed { .. }
            | Message::SetRightWheelSpeed { .. }
            | Message::SetWheelsSpeed { .. }
            | Message::Stop
            | Message::RequestWheelsState
            | Message::RequestDistance => self.in_queue.enqueue(msg),
            Message::RequestVideoStreamPort => {
                // Answered here, not by the controller: the stream manager
                // is a network-side collaborator.
                let running = self.video.running();
                let port = if running { self.video.port() } else { 0 };
                self.out_queue
                    .enqueue(Message::VideoStreamPort { port, running });
            }
            other => {
                log::warn!(
                    "{COMPONENT}: unsupported message from peer (tag {:#04x}), dropped",
                    other.tag()
                );
            }
        }
    }

    /// Serve one connected client until EOF, receive error or shutdown.
    fn serve_client(&self, mut stream: TcpStream) {
        if let Err(e) = stream.set_nonblocking(false) {
            log::error!("{COMPONENT}: failed to configure client socket: {e}");
            return;
        }
        if let Err(e) = stream.set_read_timeout(Some(CLIENT_READ_TIMEOUT)) {
            log::warn!("{COMPONENT}: failed to set read timeout: {e}");
        }

        match stream.try_clone() {
            Ok(handle) => *self.client.lock() = Some(handle),
            Err(e) => {
                log::error!("{COMPONENT}: failed to clone client socket: {e}");
                return;
            }
        }

        let mut frame = [0u8; FRAME_LEN];
        while self.running.load(Ordering::Relaxed) {
            match stream.read_exact(&mut frame) {
                Ok(()) => self.dispatch_frame(&frame),
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    // No data within the timeout; re-check the run flag.
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    log::info!("{COMPONENT}: client closed the connection");
                    break;
                }
                Err(e) => {
                    log::error!("{COMPONENT}: receive error: {e}");
                    break;
                }
            }
        }

        *self.client.lock() = None;
        let _ = stream.shutdown(Shutdown::Both);

        // The operator is gone; make sure the rover is too.
        self.in_queue.enqueue(Message::Stop);
    }

    /// Deliver one outbound message to the current client, if any.
    fn deliver(&self, msg: Message) {
        let stream = {
            let guard = self.client.lock();
            match guard.as_ref() {
                Some(stream) => match stream.try_clone() {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        log::error!("{COMPONENT}: failed to clone client socket: {e}");
                        return;
                    }
                },
                None => None,
            }
        };

        match stream {
            Some(mut stream) => {
                if let Err(e) = stream.write_all(&msg.encode()) {
                    log::warn!("{COMPONENT}: send failed: {e}");
                }
            }
            None => {
                log::info!("{COMPONENT}: client not connected, discarding outgoing message");
            }
        }
    }
}

fn run_broadcast(inner: &NetInner, socket: UdpSocket) {
    while inner.running.load(Ordering::Relaxed) {
        let available = inner.client.lock().is_none();
        let frame = Message::DeviceAvailability { available }.encode();
        if let Err(e) = socket.send_to(&frame, &inner.options.broadcast_address) {
            log::warn!("{COMPONENT}: availability broadcast failed: {e}");
        }
        inner.interruptible_sleep(inner.options.broadcast_interval);
    }
    log::debug!("{COMPONENT}: broadcast thread exiting");
}

fn run_accept(inner: &NetInner, listener: TcpListener) {
    while inner.running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                log::info!("{COMPONENT}: client connected: {addr}");
                inner.serve_client(stream);
                log::info!("{COMPONENT}: session with {addr} ended");
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                log::error!("{COMPONENT}: accept error: {e}");
            }
        }
    }
    log::debug!("{COMPONENT}: accept thread exiting");
}

fn run_outbound(inner: &NetInner) {
    while let Some(msg) = inner.out_queue.dequeue() {
        inner.deliver(msg);
    }
    log::debug!("{COMPONENT}: outbound thread exiting");
}

/// Network-side service. `start` binds the sockets and spawns the three
/// worker threads; `stop` unwinds them.
pub struct NetService {
    inner: Arc<NetInner>,
    local_addr: std::net::SocketAddr,
    threads: Vec<JoinHandle<()>>,
}

impl NetService {
    /// Bind the TCP listener and UDP broadcast socket, then start the
    /// worker threads. Bind/listen failure is a startup resource failure
    /// and propagates to the caller.
    pub fn start(
        in_queue: Arc<BlockingQueue<Message>>,
        out_queue: Arc<BlockingQueue<Message>>,
        video: Arc<VideoStreamStatus>,
        options: NetOptions,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&options.bind_address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        log::info!("{COMPONENT}: listening on {local_addr}");

        let broadcast_socket = UdpSocket::bind("0.0.0.0:0")?;
        broadcast_socket.set_broadcast(true)?;
        log::info!(
            "{COMPONENT}: availability broadcast to {} every {:?}",
            options.broadcast_address,
            options.broadcast_interval
        );

        let inner = Arc::new(NetInner {
            in_queue,
            out_queue,
            video,
            client: Mutex::new(None),
            running: AtomicBool::new(true),
            options,
        });
        let mut threads = Vec::with_capacity(3);

        let broadcast_inner = Arc::clone(&inner);
        threads.push(
            thread::Builder::new()
                .name("availability-broadcast".to_string())
                .spawn(move || run_broadcast(&broadcast_inner, broadcast_socket))?,
        );

        let accept_inner = Arc::clone(&inner);
        threads.push(
            thread::Builder::new()
                .name("net-accept".to_string())
                .spawn(move || run_accept(&accept_inner, listener))?,
        );

        let outbound_inner = Arc::clone(&inner);
        threads.push(
            thread::Builder::new()
                .name("net-outbound".to_string())
                .spawn(move || run_outbound(&outbound_inner))?,
        );

        Ok(Self {
            inner,
            local_addr,
            threads,
        })
    }

    /// Address the TCP listener actually bound to.
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Stop all three threads and wait for them.
    pub fn stop(&mut self) {
        self.inner.running.store(false, Ordering::Relaxed);
        self.inner.out_queue.close();

        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                log::error!("{COMPONENT}: worker thread panicked");
            }
        }
        log::info!("{COMPONENT}: stopped");
    }
}
