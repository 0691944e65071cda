use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::codec::{decode_frame, truncation, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Uses [`DEFAULT_MAX_FRAME`](crate::DEFAULT_MAX_FRAME) as the body limit.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame body (blocking).
    ///
    /// A zero-length frame is returned as an empty body. Returns
    /// `Err(FrameError::StreamClosed)` when EOF lands on a frame boundary and
    /// `Err(FrameError::TruncatedMessage)` when it lands anywhere else.
    pub fn read_frame(&mut self) -> Result<Bytes> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(body) = decode_frame(&mut self.buf, self.config.max_frame_size)? {
                return Ok(body);
            }

            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.buf.is_empty() {
                    return Err(FrameError::StreamClosed);
                }
                return Err(truncation(&self.buf));
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
