//! Host control surface: the calls a dashboard or other host makes against a
//! running bridge.
//!
//! [`ControlState`] wraps the [`DeviceRegistry`] and offers three operations:
//! list devices, connect/disconnect a device, and run a device command.  The
//! methods on `ControlState` are blocking (opening a serial port blocks), so
//! async hosts call the free functions at the bottom of this module, which
//! move the work onto Tokio's blocking pool.
//!
//! # Data Transfer Objects (DTOs)
//!
//! The internal types (`Node`, `Device`, `SocketAddr`) are not what a host
//! wants to serialise.  DTOs are plain structs with JSON-friendly fields,
//! derived with `Serialize`/`Deserialize`.
//!
//! # `CommandResult<T>` wrapper
//!
//! The async functions return `CommandResult<T>` rather than `Result<T, E>`
//! so every response has the same shape:
//! `{ success: bool, data: T | null, error: string | null, code: string | null }`.
//! `code` is the stable [`ErrorKind`](bridge_core::ErrorKind) string a host
//! uses to pick its retry behaviour.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::application::commands::Commands;
use crate::application::device::{Device, DeviceRegistry};
use crate::application::node::Node;
use crate::error::BridgeError;
use crate::infrastructure::runtime::load_commands;
use crate::infrastructure::storage::config::{BridgeConfig, DeviceConfig, NodeConfig};

// ── Shared state ──────────────────────────────────────────────────────────────

/// The registry as seen by a host.
#[derive(Debug, Clone)]
pub struct ControlState {
    registry: Arc<DeviceRegistry>,
}

/// Requested serial state for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialState {
    Connect,
    Disconnect,
}

impl ControlState {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    fn device(&self, name: &str) -> Result<&Arc<Device>, BridgeError> {
        self.registry
            .get(name)
            .ok_or_else(|| BridgeError::UnknownDevice(name.to_string()))
    }

    /// Summaries of every device, in declared order.
    pub fn list_devices(&self) -> Vec<DeviceDto> {
        self.registry.iter().map(|d| DeviceDto::from_device(d)).collect()
    }

    /// Connects or disconnects `device` and returns its resulting connected
    /// flag.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownDevice`], plus whatever
    /// [`Device::serial_connect`] or [`Device::serial_disconnect`] return.
    pub fn set_serial_state(&self, device: &str, state: SerialState) -> Result<bool, BridgeError> {
        let device = self.device(device)?;
        let result = match state {
            SerialState::Connect => device.serial_connect(),
            SerialState::Disconnect => device.serial_disconnect(),
        };
        if let Err(e) = &result {
            warn!("{}: serial {state:?} failed: {e} [{}]", device.name(), e.code());
        }
        result.map(|()| device.is_connected())
    }

    /// Runs `command` on `device`'s nodes.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownDevice`]; [`BridgeError::UnknownCommand`] when
    /// the device has no command module or the module does not define
    /// `command`; otherwise whatever the handler returns.
    pub fn run_command(&self, device: &str, command: &str) -> Result<(), BridgeError> {
        let device = self.device(device)?;
        info!("{}: running command {command}", device.name());
        device.run_command(command)
    }
}

// ── Data Transfer Objects ─────────────────────────────────────────────────────

/// One node as shown to a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDto {
    pub name: String,
    pub com_port: String,
    /// The serial line parameters, e.g. `"9600 8N1"`.
    pub settings: String,
    pub tcp_port: u16,
    pub connected: bool,
    pub clients: Vec<String>,
}

/// One command-list entry.  Dividers have `divider = true` and no icon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDto {
    pub name: String,
    pub icon: Option<String>,
    pub divider: bool,
}

/// One device as shown to a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDto {
    pub name: String,
    pub connected: bool,
    pub nodes: Vec<NodeDto>,
    pub commands: Vec<CommandDto>,
}

impl NodeDto {
    fn from_node(node: &Node) -> Self {
        let serial = node.serial_config();
        Self {
            name: node.name().to_string(),
            com_port: serial.port.clone(),
            settings: serial.line_settings(),
            tcp_port: node.local_addr().port(),
            connected: node.is_connected(),
            clients: node.client_addrs().iter().map(ToString::to_string).collect(),
        }
    }

    fn from_config(node: &NodeConfig) -> Result<Self, BridgeError> {
        let serial = node.serial_config()?;
        Ok(Self {
            name: node.name.clone(),
            com_port: serial.port.clone(),
            settings: serial.line_settings(),
            tcp_port: node.tcp_port,
            connected: false,
            clients: Vec::new(),
        })
    }
}

fn command_dtos(commands: Option<&Commands>) -> Vec<CommandDto> {
    commands
        .map(|c| {
            c.iter()
                .map(|e| CommandDto {
                    name: e.name.clone(),
                    icon: e.icon.clone(),
                    divider: e.is_divider(),
                })
                .collect()
        })
        .unwrap_or_default()
}

impl DeviceDto {
    fn from_device(device: &Device) -> Self {
        Self {
            name: device.name().to_string(),
            connected: device.is_connected(),
            nodes: device.nodes().iter().map(|n| NodeDto::from_node(n)).collect(),
            commands: command_dtos(device.commands()),
        }
    }

    fn from_config(device: &DeviceConfig) -> Result<Self, BridgeError> {
        let commands = load_commands(device)?;
        Ok(Self {
            name: device.name.clone(),
            connected: false,
            nodes: device
                .nodes
                .iter()
                .map(NodeDto::from_config)
                .collect::<Result<_, _>>()?,
            commands: command_dtos(commands.as_ref()),
        })
    }
}

/// Device summaries straight from configuration.
///
/// Binds no TCP port and opens no serial port, so it works while another
/// bridge is running with the same file.  Every device reports disconnected.
///
/// # Errors
///
/// Invalid serial parameters or an unknown command module.
pub fn describe_config(config: &BridgeConfig) -> Result<Vec<DeviceDto>, BridgeError> {
    config.devices.iter().map(DeviceDto::from_config).collect()
}

// ── Result wrapper ────────────────────────────────────────────────────────────

/// Uniform response shape for host calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub code: Option<String>,
}

impl<T> CommandResult<T> {
    /// Creates a successful result wrapping `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    /// Creates a failed result carrying the error's message and code.
    pub fn err(e: &BridgeError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(e.to_string()),
            code: Some(e.code().to_string()),
        }
    }
}

impl<T> From<Result<T, BridgeError>> for CommandResult<T> {
    fn from(result: Result<T, BridgeError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(&e),
        }
    }
}

// ── Async host calls ──────────────────────────────────────────────────────────

async fn blocking<T, F>(state: &ControlState, op: F) -> CommandResult<T>
where
    T: Send + 'static,
    F: FnOnce(&ControlState) -> Result<T, BridgeError> + Send + 'static,
{
    let state = state.clone();
    match tokio::task::spawn_blocking(move || op(&state)).await {
        Ok(result) => result.into(),
        Err(e) => CommandResult::err(&BridgeError::Command(anyhow::Error::new(e))),
    }
}

/// Returns a summary of every device.
pub async fn list_devices(state: &ControlState) -> CommandResult<Vec<DeviceDto>> {
    CommandResult::ok(state.list_devices())
}

/// Connects or disconnects a device; `data` is the resulting connected flag.
pub async fn set_serial_state(
    state: &ControlState,
    device: String,
    requested: SerialState,
) -> CommandResult<bool> {
    blocking(state, move |s| s.set_serial_state(&device, requested)).await
}

/// Runs a device command.
pub async fn run_command(
    state: &ControlState,
    device: String,
    command: String,
) -> CommandResult<()> {
    blocking(state, move |s| s.run_command(&device, &command)).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
