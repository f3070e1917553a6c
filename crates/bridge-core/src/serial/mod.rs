//! Serial line parameters.
//!
//! A [`SerialConfig`] describes *how* to open a serial port: its OS name,
//! baud rate, and character framing.  It is pure data; opening the port is
//! the server crate's job.
//!
//! # Character framing (for beginners)
//!
//! Each character on an asynchronous serial line is sent as a start bit,
//! `data_bits` data bits, an optional parity bit, and `stop_bits` stop bits.
//! The classic "8N1" is 8 data bits, no parity, 1 stop bit.  Both ends of the
//! line must agree on all of these or the received bytes are garbage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;

/// Errors produced while validating serial line parameters.
#[derive(Debug, Error, PartialEq)]
pub enum SerialConfigError {
    #[error("serial port name must not be empty")]
    EmptyPort,
    #[error("baud rate must be greater than zero")]
    ZeroBaudRate,
    #[error("invalid byte size {0}; expected 5, 6, 7 or 8")]
    InvalidByteSize(u8),
    #[error("invalid parity {0:?}; expected none, odd, even, mark or space")]
    InvalidParity(String),
    #[error("invalid stop bits {0}; expected 1, 1.5 or 2")]
    InvalidStopBits(f32),
}

impl SerialConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidConfig
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    pub fn as_u8(self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = SerialConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(SerialConfigError::InvalidByteSize(other)),
        }
    }
}

/// Parity bit mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl Parity {
    pub fn as_str(self) -> &'static str {
        match self {
            Parity::None => "none",
            Parity::Odd => "odd",
            Parity::Even => "even",
            Parity::Mark => "mark",
            Parity::Space => "space",
        }
    }

    /// Single-letter form used in `8N1`-style notation.
    pub fn letter(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        }
    }
}

impl FromStr for Parity {
    type Err = SerialConfigError;

    /// Accepts the full name or its first letter, in any case
    /// (`"none"`, `"N"`, `"Even"`, `"e"`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let parity = match lower.as_str() {
            "none" | "n" => Parity::None,
            "odd" | "o" => Parity::Odd,
            "even" | "e" => Parity::Even,
            "mark" | "m" => Parity::Mark,
            "space" | "s" => Parity::Space,
            _ => return Err(SerialConfigError::InvalidParity(s.to_string())),
        };
        Ok(parity)
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of stop bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

impl StopBits {
    pub fn as_f32(self) -> f32 {
        match self {
            StopBits::One => 1.0,
            StopBits::OnePointFive => 1.5,
            StopBits::Two => 2.0,
        }
    }
}

impl TryFrom<f32> for StopBits {
    type Error = SerialConfigError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        // Exact comparison: the accepted values are all representable.
        if value == 1.0 {
            Ok(StopBits::One)
        } else if value == 1.5 {
            Ok(StopBits::OnePointFive)
        } else if value == 2.0 {
            Ok(StopBits::Two)
        } else {
            Err(SerialConfigError::InvalidStopBits(value))
        }
    }
}

/// Validated parameters for opening one serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// OS port identifier, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl SerialConfig {
    /// An 8N1 configuration for `port` at `baud_rate`.
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }

    /// Validates loosely-typed settings (as found in a config file).
    ///
    /// # Errors
    ///
    /// Returns a [`SerialConfigError`] (kind `InvalidConfig`) for an empty
    /// port name, a zero baud rate, a byte size outside 5..=8, an unknown
    /// parity, or stop bits other than 1, 1.5 or 2.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bridge_core::{Parity, SerialConfig};
    ///
    /// let cfg = SerialConfig::from_settings("COM3", 9600, 7, "even", 2.0).unwrap();
    /// assert_eq!(cfg.parity, Parity::Even);
    /// assert!(SerialConfig::from_settings("COM3", 9600, 9, "none", 1.0).is_err());
    /// ```
    pub fn from_settings(
        port: &str,
        baud_rate: u32,
        byte_size: u8,
        parity: &str,
        stop_bits: f32,
    ) -> Result<Self, SerialConfigError> {
        if port.trim().is_empty() {
            return Err(SerialConfigError::EmptyPort);
        }
        if baud_rate == 0 {
            return Err(SerialConfigError::ZeroBaudRate);
        }
        Ok(Self {
            port: port.to_string(),
            baud_rate,
            data_bits: DataBits::try_from(byte_size)?,
            parity: parity.parse()?,
            stop_bits: StopBits::try_from(stop_bits)?,
        })
    }

    /// Baud rate and frame format without the port, e.g. `"9600 7E2"`.
    pub fn line_settings(&self) -> String {
        format!(
            "{} {}{}{}",
            self.baud_rate,
            self.data_bits.as_u8(),
            self.parity.letter(),
            self.stop_bits.as_f32()
        )
    }
}

impl fmt::Display for SerialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.port, self.line_settings())
    }
}
