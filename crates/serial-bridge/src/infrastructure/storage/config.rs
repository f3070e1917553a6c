//! TOML configuration for the bridge.
//!
//! The file lists every device, its nodes, and the optional multiplex front
//! end:
//!
//! ```toml
//! [bridge]
//! bind_address = "0.0.0.0"
//! poll_interval_us = 100
//!
//! [[devices]]
//! name = "Bench A"
//! commands = "console"
//!
//! [[devices.nodes]]
//! name = "uart0"
//! com_port = "/dev/ttyUSB0"
//! baud_rate = 115200
//! tcp_port = 9000
//!
//! [multiplex]
//! enabled = true
//! port = 7777
//!
//! [[multiplex.devices]]
//! name = "foo"
//! com_port = "/dev/ttyUSB1"
//! baud_rate = 9600
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent, so a config only has to spell out
//! what differs from the usual 8N1 serial line.  A missing file is not an
//! error: it yields a bridge with no devices.

use std::path::{Path, PathBuf};

use bridge_core::{SerialConfig, SerialConfigError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub multiplex: MultiplexConfig,
}

/// Process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSection {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Address every node listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Sleep between polling sweeps, in microseconds.
    #[serde(default = "default_poll_interval_us")]
    pub poll_interval_us: u64,
    /// Connect every device at startup.
    #[serde(default = "default_true")]
    pub auto_connect: bool,
}

/// One device: a named group of nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    pub name: String,
    /// Name of a built-in command module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

/// One node: a serial port plus the TCP port that exposes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    pub name: String,
    pub com_port: String,
    pub baud_rate: u32,
    #[serde(default = "default_byte_size")]
    pub byte_size: u8,
    #[serde(default = "default_parity")]
    pub parity: String,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: f32,
    pub tcp_port: u16,
}

/// The multiplexed single-port front end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultiplexConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_multiplex_port")]
    pub port: u16,
    /// Delay between serial polls, in milliseconds.
    #[serde(default = "default_multiplex_poll_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub devices: Vec<PortConfig>,
}

/// A named serial port served by the multiplex front end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortConfig {
    pub name: String,
    pub com_port: String,
    pub baud_rate: u32,
    #[serde(default = "default_byte_size")]
    pub byte_size: u8,
    #[serde(default = "default_parity")]
    pub parity: String,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: f32,
}

impl NodeConfig {
    /// Validates the serial parameters.
    pub fn serial_config(&self) -> Result<SerialConfig, SerialConfigError> {
        SerialConfig::from_settings(
            &self.com_port,
            self.baud_rate,
            self.byte_size,
            &self.parity,
            self.stop_bits,
        )
    }
}

impl PortConfig {
    /// Validates the serial parameters.
    pub fn serial_config(&self) -> Result<SerialConfig, SerialConfigError> {
        SerialConfig::from_settings(
            &self.com_port,
            self.baud_rate,
            self.byte_size,
            &self.parity,
            self.stop_bits,
        )
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_poll_interval_us() -> u64 {
    100
}
fn default_true() -> bool {
    true
}
fn default_byte_size() -> u8 {
    8
}
fn default_parity() -> String {
    "none".to_string()
}
fn default_stop_bits() -> f32 {
    1.0
}
fn default_multiplex_port() -> u16 {
    7777
}
fn default_multiplex_poll_ms() -> u64 {
    5
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            bind_address: default_bind_address(),
            poll_interval_us: default_poll_interval_us(),
            auto_connect: default_true(),
        }
    }
}

impl Default for MultiplexConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_bind_address(),
            port: default_multiplex_port(),
            poll_interval_ms: default_multiplex_poll_ms(),
            devices: Vec::new(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses configuration text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed or a required
/// field is missing.
pub fn parse_config(text: &str) -> Result<BridgeConfig, ConfigError> {
    Ok(toml::from_str(text)?)
}

/// Loads the configuration at `path`, returning `BridgeConfig::default()` if
/// the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BridgeConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::{DataBits, Parity, StopBits};

    #[test]
    fn test_default_config_has_no_devices_and_standard_ports() {
        // Arrange / Act
        let cfg = BridgeConfig::default();

        // Assert
        assert!(cfg.devices.is_empty());
        assert!(!cfg.multiplex.enabled);
        assert_eq!(cfg.multiplex.port, 7777);
        assert_eq!(cfg.bridge.poll_interval_us, 100);
        assert!(cfg.bridge.auto_connect);
    }

    #[test]
    fn test_parse_minimal_node_uses_serial_defaults() {
        // Arrange
        let text = r#"
[[devices]]
name = "bench"

[[devices.nodes]]
name = "uart0"
com_port = "/dev/ttyUSB0"
baud_rate = 115200
tcp_port = 9000
"#;

        // Act
        let cfg = parse_config(text).expect("parse");
        let serial = cfg.devices[0].nodes[0].serial_config().expect("valid");

        // Assert
        assert_eq!(cfg.bridge.log_level, "info");
        assert_eq!(cfg.devices[0].commands, None);
        assert_eq!(serial.data_bits, DataBits::Eight);
        assert_eq!(serial.parity, Parity::None);
        assert_eq!(serial.stop_bits, StopBits::One);
    }

    #[test]
    fn test_parse_accepts_integer_stop_bits_and_short_parity() {
        let text = r#"
[multiplex]
enabled = true

[[multiplex.devices]]
name = "foo"
com_port = "COM4"
baud_rate = 9600
byte_size = 7
parity = "E"
stop_bits = 2
"#;

        let cfg = parse_config(text).expect("parse");
        let serial = cfg.multiplex.devices[0].serial_config().expect("valid");

        assert!(cfg.multiplex.enabled);
        assert_eq!(serial.parity, Parity::Even);
        assert_eq!(serial.stop_bits, StopBits::Two);
        assert_eq!(serial.data_bits, DataBits::Seven);
    }

    #[test]
    fn test_node_without_tcp_port_is_parse_error() {
        let text = r#"
[[devices]]
name = "bench"

[[devices.nodes]]
name = "uart0"
com_port = "COM1"
baud_rate = 9600
"#;

        assert!(matches!(parse_config(text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_serial_settings_are_reported_by_serial_config() {
        let node = NodeConfig {
            name: "uart0".into(),
            com_port: "COM1".into(),
            baud_rate: 9600,
            byte_size: 9,
            parity: default_parity(),
            stop_bits: default_stop_bits(),
            tcp_port: 9000,
        };

        assert_eq!(
            node.serial_config(),
            Err(SerialConfigError::InvalidByteSize(9))
        );
    }

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let path = Path::new("/nonexistent/path/that/cannot/exist/serial-bridge.toml");

        let cfg = load_config(path).expect("missing file is not an error");

        assert_eq!(cfg, BridgeConfig::default());
    }

    #[test]
    fn test_load_config_reads_file_from_disk() {
        // Arrange
        let path =
            std::env::temp_dir().join(format!("serial_bridge_{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[bridge]\nlog_level = \"debug\"\n").unwrap();

        // Act
        let cfg = load_config(&path).expect("load");

        // Assert
        assert_eq!(cfg.bridge.log_level, "debug");

        // Cleanup
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut cfg = BridgeConfig::default();
        cfg.devices.push(DeviceConfig {
            name: "bench".into(),
            commands: Some("console".into()),
            nodes: Vec::new(),
        });

        let text = toml::to_string_pretty(&cfg).expect("serialize");
        let restored = parse_config(&text).expect("parse");

        assert_eq!(cfg, restored);
    }
}
