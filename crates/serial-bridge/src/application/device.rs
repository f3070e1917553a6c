//! Devices and the device registry.
//!
//! A [`Device`] groups the nodes of one physical board (console UART, debug
//! UART, ...) so they connect and disconnect together.  Connecting is
//! all-or-nothing: either every node's port is open, or none of the ports
//! opened by this attempt remain open.
//!
//! # Connect with rollback
//!
//! ```text
//! nodes:   A        B        C
//!          connect  connect  (never attempted)
//!          ok       FAILS
//!          ◄── rollback: disconnect A
//! result:  Err(B's failure), device still disconnected
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::application::commands::Commands;
use crate::application::lock;
use crate::application::node::Node;
use crate::error::BridgeError;

/// Result of disconnecting one node while undoing a failed connect.
#[derive(Debug)]
pub struct RollbackOutcome {
    pub node: String,
    pub result: Result<(), BridgeError>,
}

/// Disconnects `nodes` in reverse order, collecting every outcome.
///
/// Failures are returned, never raised, so a rollback can never mask the
/// error that triggered it.
pub fn rollback(nodes: &[Arc<Node>]) -> Vec<RollbackOutcome> {
    nodes
        .iter()
        .rev()
        .map(|node| RollbackOutcome {
            node: node.name().to_string(),
            result: node.disconnect(),
        })
        .collect()
}

/// A named group of nodes with a shared lifecycle and command set.
pub struct Device {
    name: String,
    nodes: Vec<Arc<Node>>,
    commands: Option<Commands>,
    /// Serialises connect/disconnect for their full duration.
    transition: Mutex<()>,
    connected: AtomicBool,
}

impl Device {
    /// Creates a disconnected device and attaches each node to it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::DuplicateName`] if two nodes share a name and
    /// [`BridgeError::InvalidConfig`] for an empty device name or a node that
    /// already belongs to another device.
    pub fn new(
        name: impl Into<String>,
        nodes: Vec<Arc<Node>>,
        commands: Option<Commands>,
    ) -> Result<Self, BridgeError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BridgeError::InvalidConfig(
                "device name must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for node in &nodes {
            if !seen.insert(node.name()) {
                return Err(BridgeError::DuplicateName(format!(
                    "{name}:{}",
                    node.name()
                )));
            }
            if let Some(owner) = node.device_name().filter(|owner| *owner != name) {
                return Err(BridgeError::InvalidConfig(format!(
                    "node {:?} already belongs to device {owner:?}",
                    node.name()
                )));
            }
        }
        for node in &nodes {
            node.attach_to(&name)?;
        }

        Ok(Self {
            name,
            nodes,
            commands,
            transition: Mutex::new(()),
            connected: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nodes in declared order.
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&Arc<Node>> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    pub fn commands(&self) -> Option<&Commands> {
        self.commands.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Opens every node's serial port, in declared order.
    ///
    /// On the first failure, every node opened by this call is disconnected
    /// again and the original failure is returned.  Later nodes are never
    /// attempted.
    ///
    /// # Errors
    ///
    /// [`BridgeError::AlreadyConnected`], or the failing node's error
    /// (usually [`BridgeError::PortUnavailable`]).
    pub fn serial_connect(&self) -> Result<(), BridgeError> {
        let _transition = lock(&self.transition);
        if self.is_connected() {
            return Err(BridgeError::AlreadyConnected(self.name.clone()));
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if let Err(err) = node.connect() {
                let outcomes = rollback(&self.nodes[..i]);
                for outcome in &outcomes {
                    if let Err(e) = &outcome.result {
                        warn!(
                            "{}: rollback of node {} failed: {e}",
                            self.name, outcome.node
                        );
                    }
                }
                warn!(
                    "{}: connect failed at node {} ({err}); rolled back {} node(s)",
                    self.name,
                    node.name(),
                    outcomes.len()
                );
                return Err(err);
            }
        }

        self.connected.store(true, Ordering::SeqCst);
        info!("{}: serial connected ({} node(s))", self.name, self.nodes.len());
        Ok(())
    }

    /// Closes every node's serial port.
    ///
    /// Every node is attempted even if an earlier one fails, and the device
    /// ends disconnected regardless.  The first failure is returned.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotConnected`], or the first node failure.
    pub fn serial_disconnect(&self) -> Result<(), BridgeError> {
        let _transition = lock(&self.transition);
        if !self.is_connected() {
            return Err(BridgeError::NotConnected(self.name.clone()));
        }

        let mut first_failure = None;
        for node in &self.nodes {
            if let Err(e) = node.disconnect() {
                warn!("{}: disconnect of node {} failed: {e}", self.name, node.name());
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        info!("{}: serial disconnected", self.name);
        first_failure.map_or(Ok(()), Err)
    }

    /// Runs a registered command against this device's nodes.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownCommand`] when the device has no command set or
    /// the command is not registered; otherwise whatever the handler returns.
    pub fn run_command(&self, command: &str) -> Result<(), BridgeError> {
        let commands = self
            .commands
            .as_ref()
            .ok_or_else(|| BridgeError::UnknownCommand(command.to_string()))?;
        commands.run(command, &self.nodes)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("nodes", &self.nodes)
            .field("commands", &self.commands.as_ref().map(Commands::module))
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Every device of a running bridge, in declared order.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Arc<Device>>,
}

impl DeviceRegistry {
    /// # Errors
    ///
    /// Returns [`BridgeError::DuplicateName`] if two devices share a name.
    pub fn new(devices: Vec<Device>) -> Result<Self, BridgeError> {
        let mut seen = HashSet::new();
        for device in &devices {
            if !seen.insert(device.name()) {
                return Err(BridgeError::DuplicateName(device.name().to_string()));
            }
        }
        Ok(Self {
            devices: devices.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Device>> {
        self.devices.iter().find(|d| d.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Device>> + '_ {
        self.devices.iter()
    }

    /// Every node of every device, in declared order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> + '_ {
        self.devices.iter().flat_map(|d| d.nodes().iter())
    }

    /// Resolves the device a node belongs to.
    pub fn device_of(&self, node: &Node) -> Option<&Arc<Device>> {
        node.device_name().and_then(|name| self.get(name))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
