use std::io::Write;

use bytes::Bytes;
use pipecast_protocol::{EnvelopeSink, MediaKind, MediaSample, Message, ProtocolError};

/// Where pacers and the shutdown path send their commands.
///
/// Implementations must serialize concurrent calls so frames never
/// interleave on the wire.
pub trait MediaSink: Send + Sync {
    fn send_sample(&self, kind: MediaKind, sample: MediaSample) -> Result<(), ProtocolError>;

    fn send_close(&self) -> Result<(), ProtocolError>;
}

/// Cloneable command writer for the worker's input stream.
pub struct MediaSender<W> {
    sink: EnvelopeSink<W>,
}

impl<W> Clone for MediaSender<W> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
        }
    }
}

impl<W: Write> MediaSender<W> {
    pub fn new(sink: EnvelopeSink<W>) -> Self {
        Self { sink }
    }

    pub fn send_video_frame(
        &self,
        data: impl Into<Bytes>,
        timestamp_nanos: i64,
    ) -> Result<(), ProtocolError> {
        self.sink.send(&Message::WriteVideoSample(MediaSample::new(
            data,
            timestamp_nanos,
        )))
    }

    pub fn send_audio_frame(
        &self,
        data: impl Into<Bytes>,
        timestamp_nanos: i64,
    ) -> Result<(), ProtocolError> {
        self.sink.send(&Message::WriteAudioSample(MediaSample::new(
            data,
            timestamp_nanos,
        )))
    }

    /// Detach the underlying stream. Dropping it closes the worker's input.
    pub fn close(&self) -> Option<W> {
        self.sink.close()
    }
}

impl<W: Write + Send> MediaSink for MediaSender<W> {
    fn send_sample(&self, kind: MediaKind, sample: MediaSample) -> Result<(), ProtocolError> {
        let message = match kind {
            MediaKind::Video => Message::WriteVideoSample(sample),
            MediaKind::Audio => Message::WriteAudioSample(sample),
        };
        self.sink.send(&message)
    }

    fn send_close(&self) -> Result<(), ProtocolError> {
        self.sink.send(&Message::Close)
    }
}
