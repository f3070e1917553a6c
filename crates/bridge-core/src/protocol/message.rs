//! The `Message` type carried by the multiplexed protocol.
//!
//! A message is a command name plus a payload.  The payload is an ordered
//! list of byte tokens joined by single spaces; it is stored joined, so the
//! final token of a frame can carry arbitrary bytes (including spaces) and be
//! recovered verbatim with [`Message::rest`].
//!
//! Messages are immutable once constructed.

use std::fmt;

use crate::protocol::codec::{self, ProtocolError};

/// One decoded (or to-be-encoded) protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    command: String,
    payload: Vec<u8>,
}

impl Message {
    /// Builds a message whose payload is `tokens` joined by single spaces.
    ///
    /// `command` must not contain a space; the first space in a frame body
    /// always separates the command from the payload.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bridge_core::Message;
    ///
    /// let msg = Message::new("subscribe", ["foo", "bar"]);
    /// assert_eq!(msg.payload(), b"foo bar");
    /// ```
    pub fn new<I, T>(command: impl Into<String>, tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut payload = Vec::new();
        for (i, token) in tokens.into_iter().enumerate() {
            if i > 0 {
                payload.push(b' ');
            }
            payload.extend_from_slice(token.as_ref());
        }
        Self {
            command: command.into(),
            payload,
        }
    }

    /// Builds a message with no payload.
    pub fn bare(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            payload: Vec::new(),
        }
    }

    /// Builds a message from an already-joined payload.
    pub fn with_payload(command: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            command: command.into(),
            payload: payload.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns `true` when this message's command equals `command`.
    pub fn is_command(&self, command: &str) -> bool {
        self.command == command
    }

    pub fn has_payload(&self) -> bool {
        !self.payload.is_empty()
    }

    /// The full, raw payload (tokens joined by spaces).
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Iterates over the payload tokens.  An empty payload has no tokens.
    pub fn tokens(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (!self.payload.is_empty())
            .then(|| self.payload.split(|b| *b == b' '))
            .into_iter()
            .flatten()
    }

    /// Number of payload tokens.
    pub fn token_count(&self) -> usize {
        self.tokens().count()
    }

    /// Returns the token at `index` (0-based).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TokenOutOfRange`] if the payload has fewer
    /// than `index + 1` tokens.
    pub fn token(&self, index: usize) -> Result<&[u8], ProtocolError> {
        self.tokens()
            .nth(index)
            .ok_or_else(|| ProtocolError::TokenOutOfRange {
                index,
                count: self.token_count(),
            })
    }

    /// Returns the token at `index` as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TokenOutOfRange`] for a missing token and
    /// [`ProtocolError::MalformedFrame`] if the token is not valid UTF-8.
    pub fn token_str(&self, index: usize) -> Result<&str, ProtocolError> {
        let token = self.token(index)?;
        std::str::from_utf8(token).map_err(|e| {
            ProtocolError::MalformedFrame(format!("token {index} is not UTF-8: {e}"))
        })
    }

    /// Returns the raw payload that follows the first `skip` tokens.
    ///
    /// `rest(0)` is the whole payload.  This is how the opaque last token of
    /// a `send` or `data` frame is recovered without splitting it further.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TokenOutOfRange`] if fewer than `skip + 1`
    /// tokens are present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bridge_core::Message;
    ///
    /// let msg = Message::new("data", ["foo", "hello world"]);
    /// assert_eq!(msg.rest(1).unwrap(), b"hello world");
    /// ```
    pub fn rest(&self, skip: usize) -> Result<&[u8], ProtocolError> {
        if skip == 0 {
            return Ok(&self.payload);
        }
        self.payload
            .splitn(skip + 1, |b| *b == b' ')
            .nth(skip)
            .ok_or_else(|| ProtocolError::TokenOutOfRange {
                index: skip,
                count: self.token_count(),
            })
    }

    /// Encodes this message into its wire form.
    pub fn encode(&self) -> Vec<u8> {
        codec::encode(self)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload.is_empty() {
            write!(f, "{}", self.command)
        } else {
            write!(
                f,
                "{} {}",
                self.command,
                String::from_utf8_lossy(&self.payload)
            )
        }
    }
}
