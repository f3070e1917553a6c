//! In-memory serial ports for unit and integration testing.
//!
//! Allows tests to inject bytes "arriving" on a serial line, inspect what the
//! bridge wrote to it, and force open/write/close failures without any
//! hardware attached.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bridge_core::SerialConfig;

use crate::application::serial_link::{PortOpener, SerialLink};
use crate::error::BridgeError;

#[derive(Debug, Default)]
struct MockState {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    open: bool,
    open_count: usize,
    fail_writes: bool,
    fail_close: bool,
    write_delay: Duration,
}

/// Test-side view of one mock port.  Clones share the same port.
#[derive(Debug, Clone, Default)]
pub struct MockPortHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockPortHandle {
    /// Queues bytes as if they had arrived on the serial line.
    pub fn inject(&self, bytes: &[u8]) {
        self.state
            .lock()
            .expect("lock poisoned")
            .inbound
            .extend(bytes.iter().copied());
    }

    /// Injected bytes not yet read by the bridge.
    pub fn pending(&self) -> usize {
        self.state.lock().expect("lock poisoned").inbound.len()
    }

    /// Everything written to the port so far.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().expect("lock poisoned").written.clone()
    }

    /// Returns and clears the written bytes.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().expect("lock poisoned").written)
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().expect("lock poisoned").open
    }

    /// Number of successful opens of this port.
    pub fn open_count(&self) -> usize {
        self.state.lock().expect("lock poisoned").open_count
    }

    /// Makes every subsequent write fail with `BrokenPipe`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().expect("lock poisoned").fail_writes = fail;
    }

    /// Makes every subsequent write block for `delay`, like a slow line.
    pub fn set_write_delay(&self, delay: Duration) {
        self.state.lock().expect("lock poisoned").write_delay = delay;
    }

    /// Makes `close` report an error (the port is still released).
    pub fn set_fail_close(&self, fail: bool) {
        self.state.lock().expect("lock poisoned").fail_close = fail;
    }
}

struct MockLink {
    handle: MockPortHandle,
}

impl SerialLink for MockLink {
    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.handle.state.lock().expect("lock poisoned").inbound.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.handle.state.lock().expect("lock poisoned");
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let delay = self.handle.state.lock().expect("lock poisoned").write_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let mut state = self.handle.state.lock().expect("lock poisoned");
        if state.fail_writes {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        state.written.extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = self.handle.state.lock().expect("lock poisoned");
        state.open = false;
        if state.fail_close {
            return Err(io::Error::new(io::ErrorKind::Other, "mock close failure"));
        }
        Ok(())
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        if let Ok(mut state) = self.handle.state.lock() {
            state.open = false;
        }
    }
}

/// A [`PortOpener`] that hands out [`MockPortHandle`]-backed links keyed by
/// port name.
#[derive(Debug, Default)]
pub struct MockPortOpener {
    ports: Mutex<HashMap<String, MockPortHandle>>,
    unavailable: Mutex<HashSet<String>>,
}

impl MockPortOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle for `port`, creating the port if needed.
    pub fn handle(&self, port: &str) -> MockPortHandle {
        self.ports
            .lock()
            .expect("lock poisoned")
            .entry(port.to_string())
            .or_default()
            .clone()
    }

    /// Makes opening `port` fail with `PortUnavailable` until restored.
    pub fn fail_port(&self, port: &str) {
        self.unavailable
            .lock()
            .expect("lock poisoned")
            .insert(port.to_string());
    }

    pub fn restore_port(&self, port: &str) {
        self.unavailable.lock().expect("lock poisoned").remove(port);
    }
}

impl PortOpener for MockPortOpener {
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn SerialLink>, BridgeError> {
        if self
            .unavailable
            .lock()
            .expect("lock poisoned")
            .contains(&config.port)
        {
            return Err(BridgeError::PortUnavailable {
                port: config.port.clone(),
                reason: "mock port marked unavailable".to_string(),
            });
        }

        let handle = self.handle(&config.port);
        {
            let mut state = handle.state.lock().expect("lock poisoned");
            state.open = true;
            state.open_count += 1;
        }
        Ok(Box::new(MockLink { handle }))
    }
}
