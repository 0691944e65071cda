//! Envelope-level endpoints over blocking byte streams.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use pipecast_frame::{FrameConfig, FrameReader, FrameWriter};

use crate::envelope::Envelope;
use crate::error::{ProtocolError, Result};
use crate::message::Message;

/// Reads one envelope at a time from a stream.
///
/// Meant to be driven in a loop on a dedicated thread.
pub struct EnvelopeReader<R> {
    frames: FrameReader<R>,
}

impl<R: Read> EnvelopeReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: R, config: FrameConfig) -> Self {
        Self {
            frames: FrameReader::with_config(inner, config),
        }
    }

    /// Block until one complete envelope arrives.
    ///
    /// Returns `Ok(None)` for a zero-length frame, which carries nothing and
    /// should be skipped.
    pub fn read_envelope(&mut self) -> Result<Option<Envelope>> {
        let body = self.frames.read_frame()?;
        if body.is_empty() {
            return Ok(None);
        }
        Envelope::decode(body).map(Some)
    }

    pub fn into_inner(self) -> R {
        self.frames.into_inner()
    }
}

/// Shared, lock-guarded envelope writer.
///
/// Clones write to the same stream. Each envelope is encoded outside the lock
/// and written plus flushed while holding it, so concurrent writers never
/// interleave bytes.
pub struct EnvelopeSink<W> {
    inner: Arc<Mutex<Option<FrameWriter<W>>>>,
}

impl<W> Clone for EnvelopeSink<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: Write> EnvelopeSink<W> {
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: W, config: FrameConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(FrameWriter::with_config(inner, config)))),
        }
    }

    pub fn write_envelope(&self, envelope: &Envelope) -> Result<()> {
        let mut staged = BytesMut::with_capacity(envelope.encoded_len());
        envelope.encode_into(&mut staged);

        let mut guard = self.lock();
        let writer = guard.as_mut().ok_or(ProtocolError::SinkClosed)?;
        writer.send(&staged).map_err(ProtocolError::from)
    }

    pub fn send(&self, message: &Message) -> Result<()> {
        self.write_envelope(&message.to_envelope())
    }

    /// Send a zero-length frame.
    pub fn send_empty(&self) -> Result<()> {
        let mut guard = self.lock();
        let writer = guard.as_mut().ok_or(ProtocolError::SinkClosed)?;
        writer.send_empty().map_err(ProtocolError::from)
    }

    /// Detach the stream from every clone. Later writes fail with
    /// [`ProtocolError::SinkClosed`]. Dropping the returned stream closes it.
    pub fn close(&self) -> Option<W> {
        self.lock().take().map(FrameWriter::into_inner)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<FrameWriter<W>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
