//! Application layer: the bridging core.
//!
//! # Sub-modules
//!
//! - **`serial_link`** – The `SerialLink` / `PortOpener` traits every serial
//!   consumer depends on.  Concrete ports live in `infrastructure::serial`.
//!
//! - **`node`** – One serial port exposed as one TCP endpoint, fanning serial
//!   output out to every connected client.
//!
//! - **`device`** – A named group of nodes with all-or-nothing
//!   connect/disconnect, plus the `DeviceRegistry` that owns every device.
//!
//! - **`commands`** – Command modules, the process-wide registry cache, and
//!   the restricted API handlers use to write to nodes.
//!
//! - **`poller`** – The single polling driver that reads every serial port.
//!
//! This layer uses blocking `std::net` sockets and threads, but never an OS
//! serial API: ports arrive through the `PortOpener` trait.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod commands;
pub mod device;
pub mod node;
pub mod poller;
pub mod serial_link;

/// Locks `mutex`, recovering the data if another thread panicked while
/// holding it.  Every guarded value here stays consistent across a panic.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
