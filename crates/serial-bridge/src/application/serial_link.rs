//! Port abstractions used by nodes and the multiplex server.
//!
//! The application layer never talks to an OS serial driver directly.  It
//! asks a [`PortOpener`] for a [`SerialLink`] and drives that; the production
//! opener lives in `infrastructure::serial::system` and an in-memory one in
//! `infrastructure::serial::mock`.

use std::io;

use bridge_core::SerialConfig;

use crate::error::BridgeError;

/// An open, duplex serial channel.
pub trait SerialLink: Send {
    /// Number of bytes that can be read without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Reads into `buf`, returning the number of bytes read.
    ///
    /// Callers only read what [`bytes_available`](Self::bytes_available)
    /// reported, so implementations may block when nothing is pending.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes all of `data` to the line.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Releases the port.  Dropping the link must also release it; `close`
    /// exists so a failure while releasing can be reported.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Opens serial links from validated parameters.
pub trait PortOpener: Send + Sync {
    /// # Errors
    ///
    /// Returns [`BridgeError::PortUnavailable`] if the device is missing,
    /// busy, not permitted, or cannot be configured as requested.
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn SerialLink>, BridgeError>;
}
