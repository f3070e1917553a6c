//! Streaming frame decoding.
//!
//! TCP is a *stream* protocol: a single `read()` may return part of a frame,
//! exactly one frame, or several frames at once.  [`FrameBuffer`] accumulates
//! bytes and hands out complete messages; [`Frames`] drives a `FrameBuffer`
//! from any blocking [`Read`] source and exposes the result as an iterator.
//!
//! Async callers (the multiplex server) feed a `FrameBuffer` directly from
//! their own read loop.

use std::io::{ErrorKind as IoErrorKind, Read};

use tracing::trace;

use crate::protocol::codec::{decode, ProtocolError};
use crate::protocol::message::Message;

/// Size of each read pulled from the source.
const READ_CHUNK: usize = 1024;

/// Accumulates stream bytes and extracts complete messages.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends newly received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Removes and returns the next complete message, or `None` if the
    /// buffered bytes do not yet hold one.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedFrame`] if the buffered bytes can
    /// never form a valid frame.  The buffer should be discarded together
    /// with its connection.
    pub fn next_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        let (msg, rest) = decode(&self.buf)?;
        let consumed = self.buf.len() - rest.len();
        self.buf.drain(..consumed);
        Ok(msg)
    }

    /// Number of buffered bytes not yet consumed.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if any buffered byte is part of a frame (not CR/LF).
    pub fn has_partial_frame(&self) -> bool {
        self.buf.iter().any(|b| *b != b'\r' && *b != b'\n')
    }
}

/// Lazy iterator of messages decoded from a blocking byte source.
///
/// Bytes are pulled from the source only when the buffer holds no complete
/// frame.  Iteration ends cleanly when the source reports end-of-stream with
/// nothing pending; every error ends the iteration after being yielded once.
pub struct Frames<R> {
    reader: R,
    buffer: FrameBuffer,
    chunk: Vec<u8>,
    finished: bool,
}

impl<R: Read> Frames<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: FrameBuffer::new(),
            chunk: vec![0u8; READ_CHUNK],
            finished: false,
        }
    }

    /// Consumes the iterator, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn fail(&mut self, err: ProtocolError) -> Option<Result<Message, ProtocolError>> {
        self.finished = true;
        Some(Err(err))
    }
}

impl<R: Read> Iterator for Frames<R> {
    type Item = Result<Message, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            match self.buffer.next_message() {
                Ok(Some(msg)) => return Some(Ok(msg)),
                Ok(None) => {}
                Err(e) => return self.fail(e),
            }

            match self.reader.read(&mut self.chunk) {
                Ok(0) => {
                    self.finished = true;
                    if self.buffer.has_partial_frame() {
                        let pending = self.buffer.pending();
                        return Some(Err(ProtocolError::Truncated { pending }));
                    }
                    return None;
                }
                Ok(n) => {
                    trace!(bytes = n, "frame reader pulled bytes");
                    self.buffer.extend(&self.chunk[..n]);
                }
                Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
                Err(e) => return self.fail(ProtocolError::from_io(e)),
            }
        }
    }
}

/// Convenience constructor for [`Frames`].
///
/// # Examples
///
/// ```rust
/// use bridge_core::protocol::iter_frames;
///
/// let wire: &[u8] = b"9 subscribe\r\n11 unsubscribe";
/// let commands: Vec<String> = iter_frames(wire)
///     .map(|m| m.unwrap().command().to_string())
///     .collect();
/// assert_eq!(commands, ["subscribe", "unsubscribe"]);
/// ```
pub fn iter_frames<R: Read>(reader: R) -> Frames<R> {
    Frames::new(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// A reader that returns one pre-arranged chunk per `read` call.
    struct ChunkedReader {
        chunks: VecDeque<Vec<u8>>,
        reads: usize,
    }

    impl ChunkedReader {
        fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
                reads: 0,
            }
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads += 1;
            match self.chunks.pop_front() {
                Some(chunk) => {
                    assert!(chunk.len() <= buf.len(), "test chunk too large");
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    #[test]
    fn test_frame_buffer_yields_nothing_for_partial_frame() {
        let mut fb = FrameBuffer::new();
        fb.extend(b"9 subsc");
        assert!(fb.next_message().unwrap().is_none());
        assert_eq!(fb.pending(), 7);
    }

    #[test]
    fn test_frame_buffer_yields_multiple_frames_from_one_extend() {
        let mut fb = FrameBuffer::new();
        fb.extend(b"4 ping\r\n4 pong\r\n");
        assert!(fb.next_message().unwrap().unwrap().is_command("ping"));
        assert!(fb.next_message().unwrap().unwrap().is_command("pong"));
        assert!(fb.next_message().unwrap().is_none());
        assert!(!fb.has_partial_frame());
    }

    #[test]
    fn test_frames_ends_cleanly_on_eof() {
        let reader = ChunkedReader::new(&[b"4 ping"]);
        let msgs: Vec<_> = Frames::new(reader).collect();
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].as_ref().unwrap().is_command("ping"));
    }

    #[test]
    fn test_frames_does_not_read_while_a_frame_is_buffered() {
        let reader = ChunkedReader::new(&[b"4 ping4 pong", b"4 late"]);
        let mut frames = Frames::new(reader);
        frames.next().unwrap().unwrap();
        frames.next().unwrap().unwrap();
        assert_eq!(frames.into_inner().reads, 1);
    }

    #[test]
    fn test_frames_reports_truncated_frame_at_eof() {
        let reader = ChunkedReader::new(&[b"10 data"]);
        let mut frames = Frames::new(reader);
        assert!(matches!(
            frames.next(),
            Some(Err(ProtocolError::Truncated { pending: 7 }))
        ));
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_frames_ignores_trailing_line_breaks_at_eof() {
        let reader = ChunkedReader::new(&[b"4 ping\r\n"]);
        let results: Vec<_> = Frames::new(reader).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn test_frames_stops_after_malformed_frame() {
        let reader = ChunkedReader::new(&[b"4 ping", b"xx data", b"4 pong"]);
        let mut frames = Frames::new(reader);
        assert!(frames.next().unwrap().is_ok());
        assert!(matches!(
            frames.next(),
            Some(Err(ProtocolError::MalformedFrame(_)))
        ));
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_frames_maps_connection_reset() {
        struct ResetReader;
        impl Read for ResetReader {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(IoErrorKind::ConnectionReset))
            }
        }
        let mut frames = Frames::new(ResetReader);
        assert!(matches!(
            frames.next(),
            Some(Err(ProtocolError::ConnectionReset(_)))
        ));
        assert!(frames.next().is_none());
    }
}
