//! Wire tags for message and payload types.

use std::fmt;

/// What an envelope asks the receiver to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Push one raw video frame (controller → worker).
    WriteVideoSample = 1,
    /// Push one raw audio frame (controller → worker).
    WriteAudioSample = 2,
    /// Graceful shutdown request (controller → worker).
    Close = 3,
    /// Connection-state transition or fatal error (worker → controller).
    StatusResponse = 4,
    /// Diagnostic line (worker → controller).
    LogResponse = 5,
}

impl MessageKind {
    /// Map a wire tag back to a kind. Unknown tags return `None`.
    pub fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::WriteVideoSample),
            2 => Some(Self::WriteAudioSample),
            3 => Some(Self::Close),
            4 => Some(Self::StatusResponse),
            5 => Some(Self::LogResponse),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u8 {
        self as u8
    }

    /// The payload type this kind always carries.
    pub fn payload_kind(self) -> PayloadKind {
        match self {
            Self::WriteVideoSample | Self::WriteAudioSample => PayloadKind::MediaSample,
            Self::Close => PayloadKind::None,
            Self::StatusResponse => PayloadKind::Status,
            Self::LogResponse => PayloadKind::Log,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::WriteVideoSample => "WRITE_VIDEO_SAMPLE",
            Self::WriteAudioSample => "WRITE_AUDIO_SAMPLE",
            Self::Close => "CLOSE",
            Self::StatusResponse => "STATUS_RESPONSE",
            Self::LogResponse => "LOG_RESPONSE",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the payload bytes of an envelope are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadKind {
    None = 0,
    MediaSample = 1,
    Status = 2,
    Log = 3,
}

impl PayloadKind {
    pub fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::MediaSample),
            2 => Some(Self::Status),
            3 => Some(Self::Log),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_are_stable() {
        for kind in [
            MessageKind::WriteVideoSample,
            MessageKind::WriteAudioSample,
            MessageKind::Close,
            MessageKind::StatusResponse,
            MessageKind::LogResponse,
        ] {
            assert_eq!(MessageKind::from_wire(kind.to_wire()), Some(kind));
            assert_eq!(
                PayloadKind::from_wire(kind.payload_kind().to_wire()),
                Some(kind.payload_kind())
            );
        }
        assert_eq!(MessageKind::from_wire(0), None);
        assert_eq!(MessageKind::from_wire(42), None);
        assert_eq!(PayloadKind::from_wire(9), None);
    }
}
