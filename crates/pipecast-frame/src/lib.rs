//! Length-prefixed framing for pipecast pipes.
//!
//! Every frame on the wire is a 4-byte big-endian unsigned length followed by
//! exactly that many bytes. A zero length is legal and carries nothing; readers
//! hand it up as an empty frame and the protocol layer skips it.
//!
//! End of stream at a frame boundary is [`FrameError::StreamClosed`] (the peer
//! exited); end of stream anywhere else is [`FrameError::TruncatedMessage`].

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::LengthPrefixCodec;
pub use codec::{decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_FRAME, PREFIX_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
