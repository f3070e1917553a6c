//! Builds the running bridge from its configuration.

use std::sync::Arc;

use tracing::{debug, info};

use crate::application::commands::Commands;
use crate::application::device::{Device, DeviceRegistry};
use crate::application::node::{Node, NodeObserver, NodeSettings};
use crate::application::serial_link::PortOpener;
use crate::error::BridgeError;
use crate::infrastructure::storage::config::{BridgeConfig, DeviceConfig};
use crate::plugins;

/// Creates every node (binding its TCP listener), groups nodes into devices,
/// and loads each device's command module.
///
/// Nothing is connected and no listener is served yet.
///
/// # Errors
///
/// - [`BridgeError::SerialConfig`] for invalid serial parameters.
/// - [`BridgeError::DuplicateName`] for repeated node or device names.
/// - [`BridgeError::InvalidConfig`] for an unknown command module.
/// - [`BridgeError::Bind`] if a node's TCP port is unavailable.
pub fn build_registry(
    config: &BridgeConfig,
    opener: Arc<dyn PortOpener>,
    observer: Arc<dyn NodeObserver>,
) -> Result<DeviceRegistry, BridgeError> {
    let devices = config
        .devices
        .iter()
        .map(|d| build_device(d, &config.bridge.bind_address, &opener, &observer))
        .collect::<Result<Vec<_>, _>>()?;

    let registry = DeviceRegistry::new(devices)?;
    info!(
        "{} device(s) with {} node(s) configured",
        registry.len(),
        registry.nodes().count()
    );
    Ok(registry)
}

fn build_device(
    config: &DeviceConfig,
    bind_address: &str,
    opener: &Arc<dyn PortOpener>,
    observer: &Arc<dyn NodeObserver>,
) -> Result<Device, BridgeError> {
    let commands = load_commands(config)?;

    let mut nodes = Vec::with_capacity(config.nodes.len());
    for node in &config.nodes {
        let settings = NodeSettings::new(node.name.clone(), node.serial_config()?)
            .with_listener(bind_address, node.tcp_port);
        let node = Node::new(settings, Arc::clone(opener), Arc::clone(observer))?;
        debug!("node {} listening on {}", node.name(), node.local_addr());
        nodes.push(Arc::new(node));
    }

    Device::new(config.name.clone(), nodes, commands)
}

/// Loads the command module a device names, if any.
///
/// # Errors
///
/// [`BridgeError::InvalidConfig`] for an unknown module name, or whatever
/// [`Commands::load`] reports.
pub fn load_commands(config: &DeviceConfig) -> Result<Option<Commands>, BridgeError> {
    let Some(name) = config.commands.as_deref() else {
        return Ok(None);
    };
    let module = plugins::find(name).ok_or_else(|| {
        BridgeError::InvalidConfig(format!(
            "device {:?} uses unknown command module {name:?}",
            config.name
        ))
    })?;
    Commands::load(module).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::node::NullObserver;
    use crate::infrastructure::serial::MockPortOpener;
    use crate::infrastructure::storage::config::parse_config;
    use bridge_core::ErrorKind;

    fn build(text: &str) -> Result<DeviceRegistry, BridgeError> {
        let mut config = parse_config(text).expect("valid TOML");
        config.bridge.bind_address = "127.0.0.1".to_string();
        build_registry(
            &config,
            Arc::new(MockPortOpener::new()),
            Arc::new(NullObserver),
        )
    }

    #[test]
    fn test_build_registry_creates_devices_nodes_and_commands() {
        // Arrange
        let text = r#"
[[devices]]
name = "bench"
commands = "console"

[[devices.nodes]]
name = "console"
com_port = "COM1"
baud_rate = 115200
tcp_port = 0

[[devices.nodes]]
name = "aux"
com_port = "COM2"
baud_rate = 9600
parity = "even"
tcp_port = 0
"#;

        // Act
        let registry = build(text).expect("build");

        // Assert
        let device = registry.get("bench").expect("device");
        assert_eq!(device.nodes().len(), 2);
        assert_eq!(device.nodes()[0].to_string(), "bench:console");
        assert_eq!(device.commands().map(Commands::module), Some("console"));
        assert!(!device.is_connected());
    }

    #[test]
    fn test_unknown_command_module_is_invalid_config() {
        let text = r#"
[[devices]]
name = "bench"
commands = "nope"
"#;

        let err = build(text).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_invalid_serial_parameters_are_invalid_config() {
        let text = r#"
[[devices]]
name = "bench"

[[devices.nodes]]
name = "uart"
com_port = "COM1"
baud_rate = 9600
stop_bits = 3
tcp_port = 0
"#;

        let err = build(text).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_duplicate_device_names_are_rejected() {
        let text = r#"
[[devices]]
name = "bench"

[[devices]]
name = "bench"
"#;

        let err = build(text).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DuplicateName);
    }

    #[test]
    fn test_duplicate_node_names_are_rejected() {
        let text = r#"
[[devices]]
name = "bench"

[[devices.nodes]]
name = "uart"
com_port = "COM1"
baud_rate = 9600
tcp_port = 0

[[devices.nodes]]
name = "uart"
com_port = "COM2"
baud_rate = 9600
tcp_port = 0
"#;

        let err = build(text).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DuplicateName);
    }
}
