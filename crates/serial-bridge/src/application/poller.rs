//! The polling driver: the only path that reads serial ports.
//!
//! One dedicated thread sweeps every node of every device, calling
//! [`Node::poll`](crate::application::node::Node::poll), then sleeps briefly.
//! Node count and per-node read volume therefore bound latency and
//! throughput.  That suits low-bandwidth serial consoles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::application::device::DeviceRegistry;
use crate::error::BridgeError;

/// Polls every node once.  Returns the total number of bytes forwarded.
///
/// A serial failure on one node is logged and does not stop the sweep.
pub fn poll_sweep(registry: &DeviceRegistry) -> usize {
    registry
        .nodes()
        .map(|node| match node.poll() {
            Ok(n) => n,
            Err(e) => {
                warn!("{node}: poll failed: {e}");
                0
            }
        })
        .sum()
}

/// Starts the `serial-poller` thread.
///
/// The thread sweeps, sleeps `interval`, and repeats until `running` is
/// cleared.
///
/// # Errors
///
/// Returns [`BridgeError::Io`] if the thread cannot be spawned.
pub fn spawn_poller(
    registry: Arc<DeviceRegistry>,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, BridgeError> {
    let handle = thread::Builder::new()
        .name("serial-poller".to_string())
        .spawn(move || {
            info!(
                "serial poller started ({} node(s), {}µs interval)",
                registry.nodes().count(),
                interval.as_micros()
            );
            while running.load(Ordering::Relaxed) {
                poll_sweep(&registry);
                thread::sleep(interval);
            }
            info!("serial poller stopped");
        })?;
    Ok(handle)
}
