//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bridge_core::SerialConfig;
use serial_bridge::application::node::{Node, NodeObserver, NodeSettings, NullObserver};
use serial_bridge::infrastructure::serial::MockPortOpener;

/// A node on a loopback listener with an OS-assigned port.
pub fn node(opener: &Arc<MockPortOpener>, name: &str, port: &str) -> Arc<Node> {
    observed_node(opener, name, port, Arc::new(NullObserver))
}

pub fn observed_node(
    opener: &Arc<MockPortOpener>,
    name: &str,
    port: &str,
    observer: Arc<dyn NodeObserver>,
) -> Arc<Node> {
    let settings =
        NodeSettings::new(name, SerialConfig::new(port, 115200)).with_listener("127.0.0.1", 0);
    Arc::new(Node::new(settings, opener.clone(), observer).expect("node"))
}

/// Polls `condition` until it holds or two seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
