/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// End of stream exactly at a frame boundary. Normal peer exit.
    #[error("stream closed")]
    StreamClosed,

    /// End of stream inside a length prefix or inside a declared body.
    #[error("truncated message: stream ended after {received} of {expected} bytes")]
    TruncatedMessage { expected: usize, received: usize },

    /// The declared or supplied frame exceeds the configured maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The reading side of the pipe is gone.
    #[error("broken pipe (peer closed its end)")]
    BrokenPipe,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True when the peer closed the stream cleanly between frames.
    pub fn is_stream_closed(&self) -> bool {
        matches!(self, FrameError::StreamClosed)
    }

    /// True when a write found the peer's end already closed.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, FrameError::BrokenPipe)
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
