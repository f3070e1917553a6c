//! The multiplex server: many serial devices behind one TCP port.
//!
//! Clients speak the length-prefixed protocol from `bridge_core::protocol`.
//! Each connection holds a subscription set of device names:
//!
//! | Inbound frame            | Effect                                          |
//! |--------------------------|-------------------------------------------------|
//! | `subscribe`              | subscribe to every device known right now       |
//! | `subscribe a b`          | subscription set := {a, b} ∩ known devices      |
//! | `unsubscribe`            | clear the subscription set                      |
//! | `unsubscribe a`          | remove `a`                                      |
//! | `send <device> <bytes>`  | write `<bytes>` to the device's serial port     |
//! | anything else            | ignored, no reply                               |
//!
//! Serial data read from a device goes out as `data <device> <bytes>` to
//! every connection subscribed to it.  Problems with a `send` are answered
//! with a `meta <text>` frame to the sender only.
//!
//! # Task layout (for beginners)
//!
//! - [`MultiplexServer::serve`] accepts connections and spawns one task per
//!   connection.
//! - Each connection task reads and decodes frames.  Outbound frames are
//!   queued on a bounded channel and written by a separate writer task,
//!   so a broadcast never waits on a slow socket.  When a peer stops
//!   reading and its queue fills up, further `data` frames for it are
//!   dropped until it catches up.
//! - [`MultiplexServer::run_poller`] polls every serial port on a fixed
//!   interval and broadcasts what it reads.
//!
//! Serial links are blocking objects guarded by `std::sync::Mutex`.  Every
//! serial read and write runs on Tokio's blocking pool, never on a worker
//! thread, and the lock is never held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bridge_core::{FrameBuffer, Message, SerialConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::lock;
use crate::application::serial_link::{PortOpener, SerialLink};
use crate::error::BridgeError;
use crate::infrastructure::storage::config::MultiplexConfig;

/// Serial bytes read per device per poll.
const READ_CHUNK: usize = 1024;

/// How long `serve` waits in `accept` before re-checking the running flag.
const ACCEPT_TICK: Duration = Duration::from_millis(200);

/// Outbound frames queued per connection before new ones are dropped.
pub const OUTBOUND_QUEUE: usize = 256;

struct MuxDevice {
    name: String,
    serial: SerialConfig,
    link: Mutex<Box<dyn SerialLink>>,
}

struct Connection {
    remote: SocketAddr,
    subscriptions: HashSet<String>,
    tx: Sender<Vec<u8>>,
    /// Set while frames are being dropped because `tx` is full.
    lagging: bool,
}

impl Connection {
    /// Queues `frame` without waiting.  Returns `false` if it was dropped.
    fn push(&mut self, id: Uuid, frame: Vec<u8>) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => {
                if self.lagging {
                    info!("multiplex: {} ({id}) is reading again", self.remote);
                    self.lagging = false;
                }
                true
            }
            Err(TrySendError::Full(_)) => {
                if !self.lagging {
                    warn!(
                        "multiplex: {} ({id}) is not reading; dropping frames",
                        self.remote
                    );
                    self.lagging = true;
                }
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// A single TCP endpoint multiplexing many named serial devices.
pub struct MultiplexServer {
    devices: Vec<MuxDevice>,
    connections: Mutex<HashMap<Uuid, Connection>>,
    poll_interval: Duration,
}

impl MultiplexServer {
    /// Validates the configured devices and opens every serial port.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::DuplicateName`] if two devices share a name.
    /// - [`BridgeError::InvalidConfig`] for an empty name or a name with a
    ///   space (it could not be addressed in a frame).
    /// - [`BridgeError::SerialConfig`] for invalid serial parameters.
    /// - [`BridgeError::PortUnavailable`] if a port cannot be opened.
    pub fn new(
        config: &MultiplexConfig,
        opener: Arc<dyn PortOpener>,
    ) -> Result<Self, BridgeError> {
        let mut seen = HashSet::new();
        let mut devices = Vec::with_capacity(config.devices.len());
        for device in &config.devices {
            if device.name.is_empty() || device.name.contains(' ') {
                return Err(BridgeError::InvalidConfig(format!(
                    "multiplex device name {:?} must be non-empty and contain no spaces",
                    device.name
                )));
            }
            if !seen.insert(device.name.as_str()) {
                return Err(BridgeError::DuplicateName(device.name.clone()));
            }
            let serial = device.serial_config()?;
            let link = opener.open(&serial)?;
            info!("multiplex: opened {} ({serial})", device.name);
            devices.push(MuxDevice {
                name: device.name.clone(),
                serial,
                link: Mutex::new(link),
            });
        }

        Ok(Self {
            devices,
            connections: Mutex::new(HashMap::new()),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    /// Names of every served device, in configured order.
    pub fn device_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.devices.iter().map(|d| d.name.as_str())
    }

    fn device(&self, name: &[u8]) -> Option<&MuxDevice> {
        self.devices.iter().find(|d| d.name.as_bytes() == name)
    }

    pub fn connection_count(&self) -> usize {
        lock(&self.connections).len()
    }

    /// A connection's subscriptions, sorted.  `None` for an unknown id.
    pub fn subscriptions(&self, id: Uuid) -> Option<Vec<String>> {
        lock(&self.connections).get(&id).map(|c| {
            let mut names: Vec<String> = c.subscriptions.iter().cloned().collect();
            names.sort();
            names
        })
    }

    // ── Connection state machine ──────────────────────────────────────────────

    /// Registers a new connection with an empty subscription set.
    ///
    /// Returns the connection id and the receiver of its outbound frames,
    /// which holds at most [`OUTBOUND_QUEUE`] frames.  The first queued
    /// frame is `meta devices <names...>`.
    pub fn register_connection(&self, remote: SocketAddr) -> (Uuid, Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let id = Uuid::new_v4();
        let mut conn = Connection {
            remote,
            subscriptions: HashSet::new(),
            tx,
            lagging: false,
        };

        let mut tokens: Vec<&[u8]> = vec![&b"devices"[..]];
        tokens.extend(self.devices.iter().map(|d| d.name.as_bytes()));
        conn.push(id, Message::new("meta", tokens).encode());

        lock(&self.connections).insert(id, conn);
        debug!("multiplex: registered {remote} as {id}");
        (id, rx)
    }

    /// Forgets a connection.  Its outbound channel closes once the last
    /// queued frame is taken.
    pub fn unregister_connection(&self, id: Uuid) -> bool {
        match lock(&self.connections).remove(&id) {
            Some(conn) => {
                debug!("multiplex: {} ({id}) unregistered", conn.remote);
                true
            }
            None => false,
        }
    }

    /// Applies one inbound frame from connection `id`.
    ///
    /// Blocking: a `send` writes to the serial port before returning.
    pub fn handle_message(&self, id: Uuid, msg: &Message) {
        match msg.command() {
            "subscribe" => self.subscribe(id, msg),
            "unsubscribe" => self.unsubscribe(id, msg),
            "send" => self.send(id, msg),
            other => debug!("multiplex: ignoring {other:?} from {id}"),
        }
    }

    fn subscribe(&self, id: Uuid, msg: &Message) {
        let wanted: HashSet<String> = if msg.has_payload() {
            msg.tokens()
                .filter_map(|t| self.device(t))
                .map(|d| d.name.clone())
                .collect()
        } else {
            self.devices.iter().map(|d| d.name.clone()).collect()
        };
        if let Some(conn) = lock(&self.connections).get_mut(&id) {
            debug!("multiplex: {} subscribed to {wanted:?}", conn.remote);
            conn.subscriptions = wanted;
        }
    }

    fn unsubscribe(&self, id: Uuid, msg: &Message) {
        if let Some(conn) = lock(&self.connections).get_mut(&id) {
            if msg.has_payload() {
                for token in msg.tokens() {
                    conn.subscriptions.retain(|name| name.as_bytes() != token);
                }
            } else {
                conn.subscriptions.clear();
            }
        }
    }

    fn send(&self, id: Uuid, msg: &Message) {
        let Ok(target) = msg.token(0) else {
            self.reply(id, "send requires a device name");
            return;
        };
        let Some(device) = self.device(target) else {
            self.reply(
                id,
                &format!("unknown device {}", String::from_utf8_lossy(target)),
            );
            return;
        };
        let data = msg.rest(1).unwrap_or_default();
        if data.is_empty() {
            return;
        }
        if let Err(e) = lock(&device.link).write_all(data) {
            warn!("multiplex: write to {} failed: {e}", device.name);
            self.reply(id, &format!("write to {} failed: {e}", device.name));
        }
    }

    fn reply(&self, id: Uuid, text: &str) {
        let frame = Message::with_payload("meta", text.as_bytes()).encode();
        if let Some(conn) = lock(&self.connections).get_mut(&id) {
            conn.push(id, frame);
        }
    }

    // ── Serial side ───────────────────────────────────────────────────────────

    /// Queues a `data <device> <bytes>` frame for every subscriber of
    /// `device`.  Returns the number of connections it was queued for;
    /// subscribers with a full queue miss the frame.
    pub fn broadcast(&self, device: &str, bytes: &[u8]) -> usize {
        let frame = Message::new("data", [device.as_bytes(), bytes]).encode();
        let mut queued = 0;
        for (id, conn) in lock(&self.connections).iter_mut() {
            if conn.subscriptions.contains(device) && conn.push(*id, frame.clone()) {
                queued += 1;
            }
        }
        queued
    }

    /// Reads whatever each serial port has buffered and broadcasts it.
    /// Returns the number of bytes read.
    ///
    /// A failing port is logged and skipped.
    pub fn poll_devices(&self) -> usize {
        let mut total = 0;
        let mut buf = [0u8; READ_CHUNK];
        for device in &self.devices {
            let read = {
                let mut link = lock(&device.link);
                match link.bytes_available() {
                    Ok(0) => continue,
                    Ok(available) => link.read(&mut buf[..available.min(READ_CHUNK)]),
                    Err(e) => Err(e),
                }
            };
            match read {
                Ok(0) => {}
                Ok(n) => {
                    self.broadcast(&device.name, &buf[..n]);
                    total += n;
                }
                Err(e) => warn!(
                    "multiplex: read from {} ({}) failed: {e}",
                    device.name, device.serial.port
                ),
            }
        }
        total
    }

    /// Polls every device each `poll_interval_ms` until `running` is cleared.
    ///
    /// Each sweep runs on the blocking pool.
    pub async fn run_poller(self: Arc<Self>, running: Arc<AtomicBool>) {
        info!(
            "multiplex: polling {} device(s) every {:?}",
            self.devices.len(),
            self.poll_interval
        );
        while running.load(Ordering::Relaxed) {
            let server = Arc::clone(&self);
            if let Err(e) = tokio::task::spawn_blocking(move || server.poll_devices()).await {
                error!("multiplex: poll sweep failed: {e}");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        info!("multiplex: poller stopped");
    }

    // ── Network side ──────────────────────────────────────────────────────────

    /// Accepts connections on `listener` until `running` is cleared, serving
    /// each on its own task.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, running: Arc<AtomicBool>) {
        if let Ok(addr) = listener.local_addr() {
            info!("multiplex: listening on {addr}");
        }
        while running.load(Ordering::Relaxed) {
            match timeout(ACCEPT_TICK, listener.accept()).await {
                Ok(Ok((stream, remote))) => {
                    info!("multiplex: new connection from {remote}");
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        server.handle_connection(stream, remote).await;
                    });
                }
                Ok(Err(e)) => error!("multiplex: accept error: {e}"),
                Err(_) => {}
            }
        }
        info!("multiplex: accept loop stopped");
    }

    /// Runs one connection until the peer closes it or sends a bad frame.
    pub async fn handle_connection(self: Arc<Self>, stream: TcpStream, remote: SocketAddr) {
        let (mut read_half, mut write_half) = stream.into_split();
        let (id, mut outbound) = self.register_connection(remote);

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound.recv().await {
                if let Err(e) = write_half.write_all(&frame).await {
                    debug!("multiplex: write to {remote} failed: {e}");
                    break;
                }
            }
        });

        let mut frames = FrameBuffer::new();
        let mut buf = [0u8; READ_CHUNK];
        'read: loop {
            let n = match read_half.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!("multiplex: read from {remote} failed: {e}");
                    break;
                }
            };
            frames.extend(&buf[..n]);
            loop {
                match frames.next_message() {
                    Ok(Some(msg)) => self.dispatch(id, msg).await,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("multiplex: closing {remote}: {e}");
                        break 'read;
                    }
                }
            }
        }

        self.unregister_connection(id);
        writer.abort();
        info!("multiplex: lost connection to {remote}");
    }

    /// Applies `msg`, moving serial writes onto the blocking pool.  Frames
    /// from one connection are still applied in order.
    async fn dispatch(self: &Arc<Self>, id: Uuid, msg: Message) {
        if !msg.is_command("send") {
            self.handle_message(id, &msg);
            return;
        }
        let server = Arc::clone(self);
        let result = tokio::task::spawn_blocking(move || server.handle_message(id, &msg)).await;
        if let Err(e) = result {
            error!("multiplex: send from {id} failed: {e}");
        }
    }
}

impl std::fmt::Debug for MultiplexServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiplexServer")
            .field("devices", &self.device_names().collect::<Vec<_>>())
            .field("connections", &self.connection_count())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
