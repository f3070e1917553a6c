//! Protocol module containing the `Message` type, its codec, and the
//! streaming frame reader.

pub mod codec;
pub mod message;
pub mod stream;

pub use codec::{decode, encode, ProtocolError, MAX_FRAME_LEN};
pub use message::Message;
pub use stream::{iter_frames, FrameBuffer, Frames};
