//! # bridge-core
//!
//! Shared library for Serial Bridge containing the multiplexed wire codec,
//! the serial line parameter model, and the error-kind taxonomy.
//!
//! This crate is used by both the bridge server and the terminal client.
//! It has zero dependencies on OS serial APIs or network sockets: the
//! streaming frame reader works over any [`std::io::Read`].
//!
//! # Architecture overview
//!
//! Serial Bridge exposes physical serial ports to the network.  Every serial
//! line ("node") gets its own raw TCP port, and an optional multiplexing
//! front end serves many serial lines over one TCP port using a small
//! length-prefixed text protocol.
//!
//! - **`protocol`** – The `Message` type and its wire codec
//!   (`<len> <command>[ <payload>]`), plus a streaming decoder that turns an
//!   arbitrary byte stream into a sequence of messages.
//!
//! - **`serial`** – Validated serial line parameters (`SerialConfig`): baud
//!   rate, data bits, parity, and stop bits.
//!
//! - **`error`** – The [`ErrorKind`] taxonomy shared by every error type in
//!   the workspace, each kind carrying a stable string code for hosts.

pub mod error;
pub mod protocol;
pub mod serial;

pub use error::ErrorKind;
pub use protocol::codec::{decode, encode, ProtocolError, MAX_FRAME_LEN};
pub use protocol::message::Message;
pub use protocol::stream::{FrameBuffer, Frames};
pub use serial::{DataBits, Parity, SerialConfig, SerialConfigError, StopBits};
