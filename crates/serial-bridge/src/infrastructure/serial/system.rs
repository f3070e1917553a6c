//! OS serial port adapter built on the `serialport` crate.

use std::io::{self, Read, Write};
use std::time::Duration;

use bridge_core::{DataBits, Parity, SerialConfig, StopBits};
use serialport::SerialPort;
use tracing::debug;

use crate::application::serial_link::{PortOpener, SerialLink};
use crate::error::BridgeError;

/// Upper bound on a single blocking read.  Nodes only read what
/// `bytes_to_read` reported, so this is rarely reached.
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Opens real serial devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn SerialLink>, BridgeError> {
        let unavailable = |reason: String| BridgeError::PortUnavailable {
            port: config.port.clone(),
            reason,
        };

        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(to_serialport_data_bits(config.data_bits))
            .parity(to_serialport_parity(config.parity).map_err(unavailable)?)
            .stop_bits(to_serialport_stop_bits(config.stop_bits).map_err(unavailable)?)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| unavailable(e.to_string()))?;

        debug!("opened serial port {config}");
        Ok(Box::new(SystemLink { port }))
    }
}

struct SystemLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink for SystemLink {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let pending = self.port.bytes_to_read().map_err(io::Error::from)?;
        Ok(pending as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }
}

// ── Conversion functions ──────────────────────────────────────────────────────

fn to_serialport_data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

/// Mark and space parity are valid line settings that the `serialport`
/// driver cannot express.
fn to_serialport_parity(parity: Parity) -> Result<serialport::Parity, String> {
    match parity {
        Parity::None => Ok(serialport::Parity::None),
        Parity::Odd => Ok(serialport::Parity::Odd),
        Parity::Even => Ok(serialport::Parity::Even),
        Parity::Mark | Parity::Space => Err(format!("{parity} parity is not supported")),
    }
}

fn to_serialport_stop_bits(stop_bits: StopBits) -> Result<serialport::StopBits, String> {
    match stop_bits {
        StopBits::One => Ok(serialport::StopBits::One),
        StopBits::Two => Ok(serialport::StopBits::Two),
        StopBits::OnePointFive => Err("1.5 stop bits are not supported".to_string()),
    }
}
