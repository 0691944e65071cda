use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_frame, FrameConfig, PREFIX_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;

/// Writes complete frames to any `Write` stream.
///
/// Prefix and body are staged in one buffer so each frame reaches the stream
/// as a single contiguous write, then the stream is flushed.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
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

    /// Encode and send one frame body (blocking), then flush.
    pub fn send(&mut self, body: &[u8]) -> Result<()> {
        if body.len() > self.config.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: body.len(),
                max: self.config.max_frame_size,
            });
        }

        self.buf.clear();
        encode_frame(body, &mut self.buf)?;
        self.write_staged()?;
        self.flush()
    }

    /// Send a zero-length frame.
    pub fn send_empty(&mut self) -> Result<()> {
        self.send(&[])
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(map_write_error(err)),
            }
        }
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    fn write_staged(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::BrokenPipe),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    if offset > 0 {
                        tracing::debug!(written = offset, total = self.buf.len(), "frame write cut short");
                    }
                    return Err(map_write_error(err));
                }
            }
        }
        Ok(())
    }
}

fn map_write_error(err: std::io::Error) -> FrameError {
    match err.kind() {
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => FrameError::BrokenPipe,
        _ => FrameError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{decode_frame, DEFAULT_MAX_FRAME};
    use crate::reader::FrameReader;

    fn written(writer: FrameWriter<Cursor<Vec<u8>>>) -> BytesMut {
        BytesMut::from(writer.into_inner().into_inner().as_slice())
    }

    /// Accepts at most `chunk` bytes per call and fails every other call
    /// with `Interrupted`, flushes included.
    #[derive(Default)]
    struct Choppy {
        chunk: usize,
        calls: usize,
        flushes: usize,
        data: Vec<u8>,
    }

    impl Write for Choppy {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.calls += 1;
            if self.calls % 2 == 1 {
                return Err(ErrorKind::Interrupted.into());
            }
            let n = buf.len().min(self.chunk);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            if self.flushes == 1 {
                return Err(ErrorKind::Interrupted.into());
            }
            Ok(())
        }
    }

    /// Always fails with one error kind, or reports zero bytes written.
    struct Refusing(Option<ErrorKind>);

    impl Write for Refusing {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            match self.0 {
                Some(kind) => Err(kind.into()),
                None => Ok(0),
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn prefix_is_big_endian_body_length() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(b"hello").unwrap();

        let mut wire = written(writer);
        assert_eq!(&wire[..PREFIX_SIZE], &[0, 0, 0, 5]);
        let body = decode_frame(&mut wire, DEFAULT_MAX_FRAME).unwrap().unwrap();
        assert_eq!(body.as_ref(), b"hello");
        assert!(wire.is_empty());
    }

    #[test]
    fn empty_frame_is_a_bare_prefix() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(b"one").unwrap();
        writer.send_empty().unwrap();
        writer.send(b"three").unwrap();

        let wire = written(writer);
        assert_eq!(&wire[7..11], &[0, 0, 0, 0]);

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        assert_eq!(reader.read_frame().unwrap().as_ref(), b"one");
        assert!(reader.read_frame().unwrap().is_empty());
        assert_eq!(reader.read_frame().unwrap().as_ref(), b"three");
    }

    #[test]
    fn oversized_body_writes_nothing() {
        let cfg = FrameConfig { max_frame_size: 4 };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);

        let err = writer.send(b"oversized").unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { size: 9, max: 4 }));
        assert!(written(writer).is_empty());
    }

    #[test]
    fn short_and_interrupted_writes_complete_the_frame() {
        let mut writer = FrameWriter::new(Choppy {
            chunk: 3,
            ..Choppy::default()
        });
        writer.send(b"media payload").unwrap();

        let inner = writer.into_inner();
        assert_eq!(inner.data.len(), PREFIX_SIZE + 13);
        assert_eq!(&inner.data[PREFIX_SIZE..], b"media payload");
        assert_eq!(inner.flushes, 2);
    }

    #[test]
    fn peer_gone_errors_are_broken_pipe() {
        for kind in [ErrorKind::BrokenPipe, ErrorKind::ConnectionReset] {
            let err = FrameWriter::new(Refusing(Some(kind))).send(b"x").unwrap_err();
            assert!(err.is_broken_pipe(), "{kind:?} gave {err:?}");
        }

        let err = FrameWriter::new(Refusing(None)).send(b"x").unwrap_err();
        assert!(matches!(err, FrameError::BrokenPipe));

        let err = FrameWriter::new(Refusing(Some(ErrorKind::PermissionDenied)))
            .send(b"x")
            .unwrap_err();
        assert!(matches!(err, FrameError::Io(_)));
    }

    #[test]
    fn write_after_reader_dropped_fails_without_panic() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        drop(right);

        let mut writer = FrameWriter::new(left);
        let err = writer.send(b"nobody listening").unwrap_err();
        assert!(err.is_broken_pipe(), "unexpected error: {err:?}");
    }
}
