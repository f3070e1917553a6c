//! Node event sinks.
//!
//! - [`TracingObserver`] writes every event to the log.  This is what the
//!   `serial-bridge` binary installs.
//! - [`ChannelObserver`] turns events into [`NodeEvent`] values on a Tokio
//!   channel so a single dispatcher task (a dashboard, a recorder) can
//!   consume them off the I/O threads.

use std::net::SocketAddr;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, trace};

use crate::application::node::{DataSource, Node, NodeObserver};

/// Logs connects and disconnects at `info`, data at `trace`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl NodeObserver for TracingObserver {
    fn on_connect(&self, node: &Node, remote: SocketAddr) {
        info!("{node}: new connection from {remote}");
    }

    fn on_disconnect(&self, node: &Node, remote: SocketAddr) {
        info!("{node}: lost connection to {remote}");
    }

    fn on_data(&self, node: &Node, source: DataSource, data: &[u8]) {
        trace!("{node}: {} byte(s) from {source}", data.len());
    }
}

/// An owned copy of one node event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Connected {
        /// `device:node` display name.
        node: String,
        remote: SocketAddr,
    },
    Disconnected {
        node: String,
        remote: SocketAddr,
    },
    Data {
        node: String,
        source: DataSource,
        bytes: Vec<u8>,
    },
}

/// Forwards events to an unbounded channel.
///
/// Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: UnboundedSender<NodeEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, UnboundedReceiver<NodeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: NodeEvent) {
        let _ = self.tx.send(event);
    }
}

impl NodeObserver for ChannelObserver {
    fn on_connect(&self, node: &Node, remote: SocketAddr) {
        self.emit(NodeEvent::Connected {
            node: node.to_string(),
            remote,
        });
    }

    fn on_disconnect(&self, node: &Node, remote: SocketAddr) {
        self.emit(NodeEvent::Disconnected {
            node: node.to_string(),
            remote,
        });
    }

    fn on_data(&self, node: &Node, source: DataSource, data: &[u8]) {
        self.emit(NodeEvent::Data {
            node: node.to_string(),
            source,
            bytes: data.to_vec(),
        });
    }
}
