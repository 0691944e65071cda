use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::kind::{MessageKind, PayloadKind};

/// Message type (1) + payload type (1).
pub const ENVELOPE_HEADER_SIZE: usize = 2;

/// The unit carried by every frame.
///
/// Tags are kept as raw wire bytes so a receiver can still name a message
/// type it does not understand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub message_type: u8,
    pub payload_type: u8,
    pub payload: Bytes,
}

impl Envelope {
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type: kind.to_wire(),
            payload_type: kind.payload_kind().to_wire(),
            payload: payload.into(),
        }
    }

    /// The message kind, if the tag is one this build knows.
    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::from_wire(self.message_type)
    }

    pub fn payload_kind(&self) -> Option<PayloadKind> {
        PayloadKind::from_wire(self.payload_type)
    }

    /// Serialized size, excluding the frame length prefix.
    pub fn encoded_len(&self) -> usize {
        ENVELOPE_HEADER_SIZE + self.payload.len()
    }

    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u8(self.message_type);
        dst.put_u8(self.payload_type);
        dst.put_slice(&self.payload);
    }

    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut dst);
        dst.freeze()
    }

    pub fn decode(mut src: Bytes) -> Result<Self> {
        if src.remaining() < ENVELOPE_HEADER_SIZE {
            return Err(ProtocolError::malformed("envelope", "shorter than header"));
        }
        let message_type = src.get_u8();
        let payload_type = src.get_u8();
        Ok(Self {
            message_type,
            payload_type,
            payload: src,
        })
    }
}
