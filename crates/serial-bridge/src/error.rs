//! Umbrella error type for the serial-bridge server.
//!
//! Every fallible operation in this crate returns [`BridgeError`].  Hosts that
//! need to decide how to present a failure call [`BridgeError::kind`] and use
//! the stable [`ErrorKind::code`] string rather than matching on messages.

use std::io;

use bridge_core::{ErrorKind, ProtocolError, SerialConfigError};
use thiserror::Error;

/// Errors produced by nodes, devices, command registries and front ends.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration is structurally invalid (empty names, unknown modules).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serial line parameters failed validation.
    #[error(transparent)]
    SerialConfig(#[from] SerialConfigError),

    /// The serial device could not be opened.
    #[error("cannot open serial port {port}: {reason}")]
    PortUnavailable { port: String, reason: String },

    #[error("duplicate name {0:?}")]
    DuplicateName(String),

    #[error("command {0:?} is registered more than once")]
    DuplicateCommand(String),

    #[error("{0:?} is reserved for dividers and cannot name a command")]
    ReservedName(String),

    #[error("device {0:?} is already connected")]
    AlreadyConnected(String),

    #[error("device {0:?} is not connected")]
    NotConnected(String),

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("unknown node {0:?}")]
    UnknownNode(String),

    #[error("unknown device {0:?}")]
    UnknownDevice(String),

    /// A frame on the multiplexed protocol could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Reading from or writing to an open serial port failed.
    #[error("serial I/O error on {port}: {source}")]
    SerialIo {
        port: String,
        #[source]
        source: io::Error,
    },

    /// A TCP listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    /// A command handler failed with its own error.
    #[error(transparent)]
    Command(anyhow::Error),
}

impl BridgeError {
    /// The taxonomy kind for this error.
    ///
    /// For [`BridgeError::Command`], a handler error that wraps a
    /// `BridgeError` (for example an unknown node passed to `send`) reports
    /// the inner kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            BridgeError::SerialConfig(e) => e.kind(),
            BridgeError::PortUnavailable { .. } => ErrorKind::PortUnavailable,
            BridgeError::DuplicateName(_) => ErrorKind::DuplicateName,
            BridgeError::DuplicateCommand(_) => ErrorKind::DuplicateCommand,
            BridgeError::ReservedName(_) => ErrorKind::ReservedName,
            BridgeError::AlreadyConnected(_) => ErrorKind::AlreadyConnected,
            BridgeError::NotConnected(_) => ErrorKind::NotConnected,
            BridgeError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            BridgeError::UnknownNode(_) => ErrorKind::UnknownNode,
            BridgeError::UnknownDevice(_) => ErrorKind::UnknownDevice,
            BridgeError::Protocol(e) => e.kind(),
            BridgeError::SerialIo { source, .. } | BridgeError::Io(source) => {
                ErrorKind::from_io(source)
            }
            BridgeError::Bind { .. } => ErrorKind::Io,
            BridgeError::Command(inner) => inner
                .downcast_ref::<BridgeError>()
                .map(BridgeError::kind)
                .unwrap_or(ErrorKind::CommandFailed),
        }
    }

    /// Shorthand for `self.kind().code()`.
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}
