//! A Node: one serial port exposed as one TCP endpoint.
//!
//! A Node owns a TCP listener for its whole life and a serial link that comes
//! and goes with `connect`/`disconnect`.  Bytes read from the serial port are
//! copied verbatim to every attached TCP client; bytes received from any
//! client are written verbatim to the serial port.  There is no framing at
//! this layer.
//!
//! # Threads (for beginners)
//!
//! ```text
//!  accept thread ──► one thread per client ──► tcp_to_serial()
//!                                                   │
//!  poller thread ──► poll() ──► serial read ──► every client socket
//! ```
//!
//! The accept and client threads block on their sockets.  The poller thread
//! never blocks on the serial port: it only reads the bytes the driver says
//! are already waiting.  The client set is shared between all of these
//! threads, so it lives behind a `Mutex`.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, ErrorKind as IoErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

use bridge_core::SerialConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::application::lock;
use crate::application::serial_link::{PortOpener, SerialLink};
use crate::error::BridgeError;

/// Largest number of bytes moved per serial poll or socket read.
pub const READ_CHUNK: usize = 1024;

/// Where a chunk of data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Read from the serial port.
    Serial,
    /// Written by a raw TCP client.
    Tcp,
    /// Written by a command handler through the host.
    Web,
}

impl DataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::Serial => "serial",
            DataSource::Tcp => "tcp",
            DataSource::Web => "web",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-supplied sink for node events.
///
/// Methods are called synchronously on whichever thread produced the event,
/// so implementations must be quick and must not call back into the Node.
pub trait NodeObserver: Send + Sync {
    fn on_connect(&self, _node: &Node, _remote: SocketAddr) {}
    fn on_disconnect(&self, _node: &Node, _remote: SocketAddr) {}
    fn on_data(&self, _node: &Node, _source: DataSource, _data: &[u8]) {}
}

/// An observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl NodeObserver for NullObserver {}

/// Construction parameters for a [`Node`].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSettings {
    pub name: String,
    pub serial: SerialConfig,
    /// Address the TCP listener binds to.
    pub bind_address: String,
    /// TCP port; `0` lets the OS choose.
    pub tcp_port: u16,
}

impl NodeSettings {
    /// Settings that listen on an OS-chosen loopback port.
    pub fn new(name: impl Into<String>, serial: SerialConfig) -> Self {
        Self {
            name: name.into(),
            serial,
            bind_address: "127.0.0.1".to_string(),
            tcp_port: 0,
        }
    }

    pub fn with_listener(mut self, bind_address: impl Into<String>, tcp_port: u16) -> Self {
        self.bind_address = bind_address.into();
        self.tcp_port = tcp_port;
        self
    }
}

struct Client {
    remote: SocketAddr,
    stream: TcpStream,
}

/// One serial channel multiplexed to any number of TCP clients.
pub struct Node {
    name: String,
    /// Name of the owning device; set once by `Device::new`.
    device: OnceLock<String>,
    serial: SerialConfig,
    opener: Arc<dyn PortOpener>,
    observer: Arc<dyn NodeObserver>,
    link: Mutex<Option<Box<dyn SerialLink>>>,
    clients: Mutex<HashMap<Uuid, Client>>,
    /// Present until `serve` hands it to the accept thread.
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
}

impl Node {
    /// Creates a disconnected Node and binds its TCP listener.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] for an empty name and
    /// [`BridgeError::Bind`] if the listener cannot be bound.
    pub fn new(
        settings: NodeSettings,
        opener: Arc<dyn PortOpener>,
        observer: Arc<dyn NodeObserver>,
    ) -> Result<Self, BridgeError> {
        if settings.name.trim().is_empty() {
            return Err(BridgeError::InvalidConfig(
                "node name must not be empty".to_string(),
            ));
        }

        let listener = TcpListener::bind((settings.bind_address.as_str(), settings.tcp_port))
            .map_err(|source| BridgeError::Bind {
                addr: format!("{}:{}", settings.bind_address, settings.tcp_port),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            name: settings.name,
            device: OnceLock::new(),
            serial: settings.serial,
            opener,
            observer,
            link: Mutex::new(None),
            clients: Mutex::new(HashMap::new()),
            listener: Mutex::new(Some(listener)),
            local_addr,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the device this Node belongs to, once attached.
    pub fn device_name(&self) -> Option<&str> {
        self.device.get().map(String::as_str)
    }

    pub fn serial_config(&self) -> &SerialConfig {
        &self.serial
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.link).is_some()
    }

    pub fn client_count(&self) -> usize {
        lock(&self.clients).len()
    }

    pub fn client_addrs(&self) -> Vec<SocketAddr> {
        lock(&self.clients).values().map(|c| c.remote).collect()
    }

    pub(crate) fn attach_to(&self, device: &str) -> Result<(), BridgeError> {
        match self.device.get() {
            Some(existing) if existing == device => Ok(()),
            Some(existing) => Err(BridgeError::InvalidConfig(format!(
                "node {:?} already belongs to device {existing:?}",
                self.name
            ))),
            None => {
                let _ = self.device.set(device.to_string());
                Ok(())
            }
        }
    }

    // ── Serial lifecycle ──────────────────────────────────────────────────────

    /// Opens the serial port.  Opening an already-open Node is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::PortUnavailable`] if the port cannot be opened.
    pub fn connect(&self) -> Result<(), BridgeError> {
        let mut link = lock(&self.link);
        if link.is_some() {
            debug!("{self}: serial port already open");
            return Ok(());
        }
        *link = Some(self.opener.open(&self.serial)?);
        info!("{self}: opened {}", self.serial);
        Ok(())
    }

    /// Releases the serial port.
    ///
    /// The Node is always disconnected afterwards.  If the link reports a
    /// failure while closing, that failure is returned.
    pub fn disconnect(&self) -> Result<(), BridgeError> {
        let Some(mut link) = lock(&self.link).take() else {
            return Ok(());
        };
        info!("{self}: closed {}", self.serial.port);
        link.close().map_err(|e| self.serial_io(e))
    }

    // ── Data paths ────────────────────────────────────────────────────────────

    /// Moves pending serial bytes to every client and the observer.
    ///
    /// Never blocks on the serial port.  Returns the number of bytes read;
    /// `0` when disconnected or idle.  A failed send to one client is logged
    /// and does not affect the others.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SerialIo`] if the serial port itself fails.
    pub fn poll(&self) -> Result<usize, BridgeError> {
        let mut buf = [0u8; READ_CHUNK];
        let n = {
            let mut guard = lock(&self.link);
            let Some(link) = guard.as_mut() else {
                return Ok(0);
            };
            let available = link.bytes_available().map_err(|e| self.serial_io(e))?;
            if available == 0 {
                return Ok(0);
            }
            link.read(&mut buf[..available.min(READ_CHUNK)])
                .map_err(|e| self.serial_io(e))?
        };

        if n > 0 {
            self.serial_to_tcp(&buf[..n]);
        }
        Ok(n)
    }

    /// Writes bytes from a raw TCP client.  Dropped silently when offline.
    pub fn tcp_to_serial(&self, data: &[u8]) -> Result<(), BridgeError> {
        self.write_serial(DataSource::Tcp, data)
    }

    /// Writes bytes on behalf of a command handler.  Dropped silently when
    /// offline.
    pub fn web_to_serial(&self, data: &[u8]) -> Result<(), BridgeError> {
        self.write_serial(DataSource::Web, data)
    }

    fn serial_to_tcp(&self, data: &[u8]) {
        {
            let clients = lock(&self.clients);
            for client in clients.values() {
                if let Err(e) = (&client.stream).write_all(data) {
                    warn!("{self}: send to {} failed: {e}", client.remote);
                }
            }
        }
        self.observer.on_data(self, DataSource::Serial, data);
    }

    fn write_serial(&self, source: DataSource, data: &[u8]) -> Result<(), BridgeError> {
        {
            let mut guard = lock(&self.link);
            let Some(link) = guard.as_mut() else {
                trace!("{self}: dropped {} {source} byte(s) while offline", data.len());
                return Ok(());
            };
            link.write_all(data).map_err(|e| self.serial_io(e))?;
        }
        self.observer.on_data(self, source, data);
        Ok(())
    }

    fn serial_io(&self, source: io::Error) -> BridgeError {
        BridgeError::SerialIo {
            port: self.serial.port.clone(),
            source,
        }
    }

    // ── Client lifecycle ──────────────────────────────────────────────────────

    /// Attaches a client socket so it receives serial output.
    pub fn add_client(&self, id: Uuid, remote: SocketAddr, stream: TcpStream) {
        lock(&self.clients).insert(id, Client { remote, stream });
        self.observer.on_connect(self, remote);
    }

    /// Detaches and shuts down a client.  Returns `false` if `id` was not
    /// attached.
    pub fn remove_client(&self, id: Uuid) -> bool {
        let Some(client) = lock(&self.clients).remove(&id) else {
            return false;
        };
        client.stream.shutdown(Shutdown::Both).ok();
        self.observer.on_disconnect(self, client.remote);
        true
    }

    /// Starts the accept thread.  Each accepted connection gets its own
    /// receive thread.  A listener can only be served once.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] if the Node is already serving
    /// and [`BridgeError::Io`] if the thread cannot be spawned.
    pub fn serve(self: &Arc<Self>) -> Result<JoinHandle<()>, BridgeError> {
        let listener = lock(&self.listener).take().ok_or_else(|| {
            BridgeError::InvalidConfig(format!("node {self} is already serving"))
        })?;

        let node = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("node-{}", self.name))
            .spawn(move || node.accept_loop(listener))?;

        info!("{self}: listening on TCP {}", self.local_addr);
        Ok(handle)
    }

    fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Err(e) = self.start_connection(stream) {
                        warn!("{self}: could not start client connection: {e}");
                    }
                }
                Err(e) => warn!("{self}: accept failed: {e}"),
            }
        }
    }

    fn start_connection(self: &Arc<Self>, stream: TcpStream) -> io::Result<()> {
        let remote = stream.peer_addr()?;
        let reader = stream.try_clone()?;
        let id = Uuid::new_v4();
        self.add_client(id, remote, stream);

        let node = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("node-{}-client", self.name))
            .spawn(move || node.client_loop(id, remote, reader));
        if let Err(e) = spawned {
            self.remove_client(id);
            return Err(e);
        }
        Ok(())
    }

    fn client_loop(&self, id: Uuid, remote: SocketAddr, mut reader: TcpStream) {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if let Err(e) = self.tcp_to_serial(&buf[..n]) {
                        warn!("{self}: write from {remote} failed: {e}");
                    }
                }
                Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("{self}: connection from {remote} ended: {e}");
                    break;
                }
            }
        }
        self.remove_client(id);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device.get() {
            Some(device) => write!(f, "{device}:{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("device", &self.device.get())
            .field("port", &self.serial.port)
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}
