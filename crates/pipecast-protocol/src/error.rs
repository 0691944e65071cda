use pipecast_frame::FrameError;

use crate::config::MediaKind;
use crate::kind::MessageKind;

/// Errors raised while reading, writing or interpreting envelopes.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The envelope names a message type this build does not know.
    #[error("unrecognized message type {0}")]
    UnknownMessageType(u8),

    /// The payload type does not match what the message type carries.
    #[error("{kind} cannot carry payload type {payload_type}")]
    PayloadMismatch { kind: MessageKind, payload_type: u8 },

    /// A payload or envelope could not be parsed.
    #[error("malformed {what}: {reason}")]
    Malformed {
        what: &'static str,
        reason: &'static str,
    },

    /// A media sample has the wrong size for its stream.
    #[error("{kind} sample is {actual} bytes, expected {expected}")]
    SampleSize {
        kind: MediaKind,
        expected: usize,
        actual: usize,
    },

    /// The session configuration cannot drive a stream.
    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    /// The local sink was closed; nothing more can be written.
    #[error("envelope sink closed")]
    SinkClosed,
}

impl ProtocolError {
    /// True when the peer closed its stream cleanly between frames.
    pub fn is_stream_closed(&self) -> bool {
        matches!(self, ProtocolError::Frame(err) if err.is_stream_closed())
    }

    /// True when a write found the peer already gone.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, ProtocolError::Frame(err) if err.is_broken_pipe())
    }

    pub(crate) fn malformed(what: &'static str, reason: &'static str) -> Self {
        ProtocolError::Malformed { what, reason }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
