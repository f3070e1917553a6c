//! Error-kind taxonomy shared by every crate in the workspace.
//!
//! Each concrete error type (`ProtocolError`, `SerialConfigError`, the
//! server's `BridgeError`) maps itself onto one [`ErrorKind`].  Hosts such as
//! a dashboard use the kind's [`code`](ErrorKind::code) to decide how to
//! present a failure (retry button, configuration hint, ...).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse classification of every failure the bridge can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Serial line parameters are out of range, or configuration is invalid.
    InvalidConfig,
    /// The serial device could not be opened (missing, busy, permissions).
    PortUnavailable,
    /// Two nodes (or two devices) share a name.
    DuplicateName,
    /// A command module registered the same command name twice.
    DuplicateCommand,
    /// A command module used the divider sentinel as a command name.
    ReservedName,
    /// `serial_connect` on a device that is already connected.
    AlreadyConnected,
    /// `serial_disconnect` on a device that is not connected.
    NotConnected,
    /// The requested command is not registered.
    UnknownCommand,
    /// A command addressed a node name that was not supplied to it.
    UnknownNode,
    /// A wire frame could not be parsed.
    MalformedFrame,
    /// The peer closed the socket mid-stream.
    ConnectionReset,
    /// Any other socket or serial I/O failure.
    Io,
    /// The host asked for a device name that does not exist.
    UnknownDevice,
    /// A command handler returned its own error.
    CommandFailed,
}

impl ErrorKind {
    /// Stable, machine-readable code for this kind.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bridge_core::ErrorKind;
    ///
    /// assert_eq!(ErrorKind::AlreadyConnected.code(), "already-connected");
    /// ```
    pub const fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidConfig => "invalid-config",
            ErrorKind::PortUnavailable => "port-unavailable",
            ErrorKind::DuplicateName => "duplicate-name",
            ErrorKind::DuplicateCommand => "duplicate-command",
            ErrorKind::ReservedName => "reserved-name",
            ErrorKind::AlreadyConnected => "already-connected",
            ErrorKind::NotConnected => "not-connected",
            ErrorKind::UnknownCommand => "unknown-command",
            ErrorKind::UnknownNode => "unknown-node",
            ErrorKind::MalformedFrame => "malformed-frame",
            ErrorKind::ConnectionReset => "connection-reset",
            ErrorKind::Io => "io",
            ErrorKind::UnknownDevice => "unknown-device",
            ErrorKind::CommandFailed => "command-failed",
        }
    }

    /// Classifies an I/O error: peer resets are [`ErrorKind::ConnectionReset`],
    /// everything else is [`ErrorKind::Io`].
    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        match err.kind() {
            Io::ConnectionReset | Io::ConnectionAborted | Io::BrokenPipe | Io::UnexpectedEof => {
                ErrorKind::ConnectionReset
            }
            _ => ErrorKind::Io,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
