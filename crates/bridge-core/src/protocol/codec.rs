//! Text codec for the multiplexed Serial Bridge protocol.
//!
//! Wire format:
//! ```text
//! <decimal-length> <command>[ <payload>]
//! ```
//! `<decimal-length>` is the exact byte length of everything after the single
//! space that follows it.  CR/LF bytes between frames are insignificant and
//! are discarded by the decoder, so a sender may terminate frames with a line
//! break for readability.
//!
//! # Why a length prefix? (for beginners)
//!
//! The payload is a space-separated list of tokens, and the last token of a
//! `data` frame is raw serial output that may itself contain spaces, line
//! breaks, or any other byte.  A length prefix tells the receiver exactly
//! where the frame ends, so nothing inside the payload ever needs escaping.

use thiserror::Error;

use crate::error::ErrorKind;
use crate::protocol::message::Message;

/// Largest body length the decoder accepts.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Number of decimal digits needed to express [`MAX_FRAME_LEN`].
const MAX_LENGTH_DIGITS: usize = 7;

/// Errors that can occur while decoding frames or reading message tokens.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The length token is not a decimal number, or the body is unusable.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A payload token was requested past the end of the payload.
    #[error("payload token {index} out of range ({count} token(s) present)")]
    TokenOutOfRange { index: usize, count: usize },

    /// The byte source ended in the middle of a frame.
    #[error("stream ended with {pending} unconsumed byte(s)")]
    Truncated { pending: usize },

    /// The peer reset the connection while reading.
    #[error("connection reset: {0}")]
    ConnectionReset(#[source] std::io::Error),

    /// Any other read failure on the byte source.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl ProtocolError {
    /// Wraps an I/O error, separating peer resets from other failures.
    pub fn from_io(err: std::io::Error) -> Self {
        match ErrorKind::from_io(&err) {
            ErrorKind::ConnectionReset => ProtocolError::ConnectionReset(err),
            _ => ProtocolError::Io(err),
        }
    }

    /// The taxonomy kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::MalformedFrame(_) | ProtocolError::TokenOutOfRange { .. } => {
                ErrorKind::MalformedFrame
            }
            ProtocolError::Truncated { .. } | ProtocolError::ConnectionReset(_) => {
                ErrorKind::ConnectionReset
            }
            ProtocolError::Io(_) => ErrorKind::Io,
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Message`] into its wire form.
///
/// No trailing terminator is appended; receivers do not need one.
///
/// # Examples
///
/// ```rust
/// use bridge_core::{encode, Message};
///
/// let msg = Message::new("data", ["foo", "hi"]);
/// assert_eq!(encode(&msg), b"11 data foo hi");
/// ```
pub fn encode(msg: &Message) -> Vec<u8> {
    let command = msg.command().as_bytes();
    let payload = msg.payload();
    let body_len = if payload.is_empty() {
        command.len()
    } else {
        command.len() + 1 + payload.len()
    };

    let length = body_len.to_string();
    let mut buf = Vec::with_capacity(length.len() + 1 + body_len);
    buf.extend_from_slice(length.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(command);
    if !payload.is_empty() {
        buf.push(b' ');
        buf.extend_from_slice(payload);
    }
    buf
}

/// Decodes the first frame in `buf`.
///
/// Returns the decoded message (or `None` when more input is needed) together
/// with the bytes that were not consumed.  Leading CR/LF bytes are always
/// stripped from the returned remainder.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedFrame`] when the length token is not a
/// non-negative decimal integer, when it exceeds [`MAX_FRAME_LEN`], or when
/// the command is not valid UTF-8.  Insufficient data is never an error.
///
/// # Examples
///
/// ```rust
/// use bridge_core::decode;
///
/// let (msg, rest) = decode(b"\r\n9 subscribe11 unsu").unwrap();
/// assert!(msg.unwrap().is_command("subscribe"));
/// assert_eq!(rest, b"11 unsu");
///
/// let (msg, rest) = decode(rest).unwrap();
/// assert!(msg.is_none());
/// assert_eq!(rest, b"11 unsu");
/// ```
pub fn decode(buf: &[u8]) -> Result<(Option<Message>, &[u8]), ProtocolError> {
    let start = buf
        .iter()
        .position(|b| *b != b'\r' && *b != b'\n')
        .unwrap_or(buf.len());
    let data = &buf[start..];

    let Some(space) = data.iter().position(|b| *b == b' ') else {
        if data.len() > MAX_LENGTH_DIGITS {
            return Err(ProtocolError::MalformedFrame(format!(
                "length token longer than {MAX_LENGTH_DIGITS} bytes"
            )));
        }
        return Ok((None, data));
    };

    let declared = parse_length(&data[..space])?;
    let body_start = space + 1;
    if data.len() - body_start < declared {
        return Ok((None, data));
    }

    let body = &data[body_start..body_start + declared];
    let (command, payload) = match body.iter().position(|b| *b == b' ') {
        Some(i) => (&body[..i], &body[i + 1..]),
        None => (body, &body[body.len()..]),
    };
    let command = std::str::from_utf8(command)
        .map_err(|e| ProtocolError::MalformedFrame(format!("command is not UTF-8: {e}")))?;

    let msg = Message::with_payload(command, payload.to_vec());
    Ok((Some(msg), &data[body_start + declared..]))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn parse_length(token: &[u8]) -> Result<usize, ProtocolError> {
    if token.is_empty() || !token.iter().all(u8::is_ascii_digit) {
        return Err(ProtocolError::MalformedFrame(format!(
            "non-numeric length token {:?}",
            String::from_utf8_lossy(token)
        )));
    }
    if token.len() > MAX_LENGTH_DIGITS {
        return Err(ProtocolError::MalformedFrame(format!(
            "length token longer than {MAX_LENGTH_DIGITS} bytes"
        )));
    }

    // At most seven ASCII digits: cannot overflow.
    let declared = token
        .iter()
        .fold(0usize, |acc, d| acc * 10 + usize::from(d - b'0'));
    if declared > MAX_FRAME_LEN {
        return Err(ProtocolError::MalformedFrame(format!(
            "declared length {declared} exceeds the {MAX_FRAME_LEN}-byte limit"
        )));
    }
    Ok(declared)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_bare_command_has_no_payload_separator() {
        let bytes = encode(&Message::bare("unsubscribe"));
        assert_eq!(bytes, b"11 unsubscribe");
    }

    #[test]
    fn test_encode_length_counts_bytes_not_chars() {
        let msg = Message::new("meta", ["héllo"]);
        let bytes = encode(&msg);
        // "meta héllo" is 10 characters but 11 bytes.
        assert!(bytes.starts_with(b"11 "));
    }

    #[test]
    fn test_decode_round_trips_encoded_message() {
        let original = Message::new("send", [&b"foo"[..], &b"a b\r\n"[..]]);
        let bytes = encode(&original);
        let (decoded, rest) = decode(&bytes).expect("decode");
        assert_eq!(decoded, Some(original));
        assert!(rest.is_empty());
    }

    #[test]
    fn test_decode_without_space_returns_none_and_input() {
        let (msg, rest) = decode(b"12").unwrap();
        assert!(msg.is_none());
        assert_eq!(rest, b"12");
    }

    #[test]
    fn test_decode_strips_leading_line_breaks() {
        let (msg, rest) = decode(b"\r\n\n\r4 ping\r\n").unwrap();
        assert!(msg.unwrap().is_command("ping"));
        assert_eq!(rest, b"\r\n");
    }

    #[test]
    fn test_decode_short_body_returns_original_buffer() {
        let input = b"20 data foo partial";
        let (msg, rest) = decode(input).unwrap();
        assert!(msg.is_none());
        assert_eq!(rest, &input[..]);
    }

    #[test]
    fn test_decode_non_numeric_length_is_malformed() {
        let err = decode(b"abc data").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
        assert_eq!(err.kind(), ErrorKind::MalformedFrame);
    }

    #[test]
    fn test_decode_negative_length_is_malformed() {
        assert!(matches!(
            decode(b"-3 abc"),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_empty_length_token_is_malformed() {
        assert!(matches!(
            decode(b" data"),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_declared_length() {
        assert!(matches!(
            decode(b"9999999 x"),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_rejects_runaway_length_token() {
        assert!(matches!(
            decode(b"123456789012"),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_body_without_space_has_empty_payload() {
        let (msg, _) = decode(b"9 subscribe").unwrap();
        let msg = msg.unwrap();
        assert!(msg.is_command("subscribe"));
        assert!(!msg.has_payload());
    }

    #[test]
    fn test_decode_returns_bytes_after_frame() {
        let (msg, rest) = decode(b"4 ping4 pong").unwrap();
        assert!(msg.unwrap().is_command("ping"));
        assert_eq!(rest, b"4 pong");
    }

    #[test]
    fn test_decode_zero_length_frame_has_empty_command() {
        let (msg, rest) = decode(b"0 ").unwrap();
        let msg = msg.unwrap();
        assert_eq!(msg.command(), "");
        assert!(rest.is_empty());
    }

    #[test]
    fn test_decode_non_utf8_command_is_malformed() {
        assert!(matches!(
            decode(b"2 \xff\xfe"),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }
}
