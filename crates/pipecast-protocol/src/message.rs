use bytes::{Bytes, BytesMut};

use crate::envelope::Envelope;
use crate::error::{ProtocolError, Result};
use crate::kind::MessageKind;
use crate::payload::{LogResponse, MediaSample, StatusResponse};
use crate::status::{ConnectionStatus, LogLevel};

/// Typed view of an [`Envelope`]: one variant per message kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    WriteVideoSample(MediaSample),
    WriteAudioSample(MediaSample),
    Close,
    Status(StatusResponse),
    Log(LogResponse),
}

impl Message {
    pub fn status(status: ConnectionStatus, message: impl Into<String>) -> Self {
        Message::Status(StatusResponse::new(status, message))
    }

    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Message::Log(LogResponse::new(level, message))
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::WriteVideoSample(_) => MessageKind::WriteVideoSample,
            Message::WriteAudioSample(_) => MessageKind::WriteAudioSample,
            Message::Close => MessageKind::Close,
            Message::Status(_) => MessageKind::StatusResponse,
            Message::Log(_) => MessageKind::LogResponse,
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        let mut payload = BytesMut::new();
        match self {
            Message::WriteVideoSample(sample) | Message::WriteAudioSample(sample) => {
                sample.encode(&mut payload)
            }
            Message::Close => {}
            Message::Status(status) => status.encode(&mut payload),
            Message::Log(log) => log.encode(&mut payload),
        }
        Envelope::new(self.kind(), payload.freeze())
    }

    /// Interpret an envelope.
    ///
    /// Fails with [`ProtocolError::UnknownMessageType`] for tags this build
    /// does not know and [`ProtocolError::PayloadMismatch`] when the payload
    /// type disagrees with the message type.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        let kind = envelope
            .kind()
            .ok_or(ProtocolError::UnknownMessageType(envelope.message_type))?;

        if envelope.payload_type != kind.payload_kind().to_wire() {
            return Err(ProtocolError::PayloadMismatch {
                kind,
                payload_type: envelope.payload_type,
            });
        }

        let payload: Bytes = envelope.payload.clone();
        Ok(match kind {
            MessageKind::WriteVideoSample => Message::WriteVideoSample(MediaSample::decode(payload)?),
            MessageKind::WriteAudioSample => Message::WriteAudioSample(MediaSample::decode(payload)?),
            MessageKind::Close => Message::Close,
            MessageKind::StatusResponse => Message::Status(StatusResponse::decode(payload)?),
            MessageKind::LogResponse => Message::Log(LogResponse::decode(payload)?),
        })
    }
}

impl TryFrom<Envelope> for Message {
    type Error = ProtocolError;

    fn try_from(envelope: Envelope) -> Result<Self> {
        Message::from_envelope(&envelope)
    }
}

impl From<&Message> for Envelope {
    fn from(message: &Message) -> Self {
        message.to_envelope()
    }
}
