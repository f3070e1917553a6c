//! # bridge-term
//!
//! Client-side view of one device on a multiplex server.  A [`Session`]
//! builds the frames a terminal sends (`subscribe`, `send`) and picks the
//! device's output out of everything the server sends back.
//!
//! The binary in `main.rs` wires a `Session` to a TCP socket, stdin and
//! stdout.

use bridge_core::Message;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TermError {
    /// Device names travel as a single payload token.
    #[error("device name {0:?} must be non-empty and contain no spaces")]
    InvalidDevice(String),
}

/// What a server frame means to the terminal.
#[derive(Debug, PartialEq, Eq)]
pub enum Incoming<'m> {
    /// Serial output of the watched device.
    Output(&'m [u8]),
    /// A `meta` notice from the server.
    Notice(String),
    /// Data for another device, or a command this client does not know.
    Ignored,
}

/// One terminal attached to one device.
#[derive(Debug, Clone)]
pub struct Session {
    device: String,
}

impl Session {
    /// # Errors
    ///
    /// Returns [`TermError::InvalidDevice`] for an empty name or one with a
    /// space.
    pub fn new(device: impl Into<String>) -> Result<Self, TermError> {
        let device = device.into();
        if device.is_empty() || device.contains(' ') {
            return Err(TermError::InvalidDevice(device));
        }
        Ok(Self { device })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// `subscribe <device>`
    pub fn subscribe_frame(&self) -> Vec<u8> {
        Message::new("subscribe", [self.device.as_str()]).encode()
    }

    /// `send <device> <bytes>`; `None` when there is nothing to send.
    pub fn send_frame(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        (!bytes.is_empty())
            .then(|| Message::new("send", [self.device.as_bytes(), bytes]).encode())
    }

    /// Classifies a frame received from the server.
    pub fn classify<'m>(&self, msg: &'m Message) -> Incoming<'m> {
        match msg.command() {
            "data" => match (msg.token(0), msg.rest(1)) {
                (Ok(device), Ok(bytes)) if device == self.device.as_bytes() => {
                    Incoming::Output(bytes)
                }
                _ => Incoming::Ignored,
            },
            "meta" => Incoming::Notice(String::from_utf8_lossy(msg.payload()).into_owned()),
            _ => Incoming::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_name_with_space_is_rejected() {
        assert_eq!(
            Session::new("bench a").unwrap_err(),
            TermError::InvalidDevice("bench a".to_string())
        );
        assert!(Session::new("").is_err());
    }

    #[test]
    fn test_subscribe_frame_names_the_device() {
        let session = Session::new("foo").unwrap();
        assert_eq!(session.subscribe_frame(), b"13 subscribe foo");
    }

    #[test]
    fn test_send_frame_keeps_bytes_verbatim() {
        let session = Session::new("foo").unwrap();

        let frame = session.send_frame(b"ls -l\n").unwrap();

        assert_eq!(frame, b"15 send foo ls -l\n");
    }

    #[test]
    fn test_send_frame_skips_empty_input() {
        let session = Session::new("foo").unwrap();
        assert_eq!(session.send_frame(b""), None);
    }

    #[test]
    fn test_classify_keeps_only_own_device_output() {
        let session = Session::new("foo").unwrap();
        let own = Message::new("data", ["foo", "hello world"]);
        let other = Message::new("data", ["bar", "nope"]);

        assert_eq!(session.classify(&own), Incoming::Output(b"hello world"));
        assert_eq!(session.classify(&other), Incoming::Ignored);
    }

    #[test]
    fn test_classify_meta_and_unknown_commands() {
        let session = Session::new("foo").unwrap();

        assert_eq!(
            session.classify(&Message::with_payload("meta", &b"devices foo bar"[..])),
            Incoming::Notice("devices foo bar".to_string())
        );
        assert_eq!(session.classify(&Message::bare("ping")), Incoming::Ignored);
    }

    #[test]
    fn test_data_frame_without_bytes_is_ignored() {
        let session = Session::new("foo").unwrap();
        assert_eq!(session.classify(&Message::new("data", ["foo"])), Incoming::Ignored);
    }
}
