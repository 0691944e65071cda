use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, truncation, DEFAULT_MAX_FRAME};
use crate::error::{FrameError, Result};

/// `tokio_util` codec for the pipecast length-prefixed wire format.
///
/// Same semantics as [`crate::FrameReader`]: zero-length frames come out as
/// empty bodies and EOF inside a frame is [`FrameError::TruncatedMessage`].
/// A clean EOF simply ends the stream.
#[derive(Debug, Clone)]
pub struct LengthPrefixCodec {
    max_frame_size: usize,
}

impl LengthPrefixCodec {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for LengthPrefixCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LengthPrefixCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        decode_frame(src, self.max_frame_size)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.decode(buf)? {
            Some(body) => Ok(Some(body)),
            None if buf.is_empty() => Ok(None),
            None => Err(truncation(buf)),
        }
    }
}

impl<B: AsRef<[u8]>> Encoder<B> for LengthPrefixCodec {
    type Error = FrameError;

    fn encode(&mut self, item: B, dst: &mut BytesMut) -> Result<()> {
        let body = item.as_ref();
        if body.len() > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: body.len(),
                max: self.max_frame_size,
            });
        }
        encode_frame(body, dst)
    }
}
