use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Length prefix: 4-byte big-endian unsigned integer.
pub const PREFIX_SIZE: usize = 4;

/// Default maximum frame body: 16 MiB (a 4K 4:2:0 frame is ~12 MiB).
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// Encode a frame body into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬──────────────────────┐
/// │ Length (4B BE)   │ Body (Length bytes)  │
/// └──────────────────┴──────────────────────┘
/// ```
pub fn encode_frame(body: &[u8], dst: &mut BytesMut) -> Result<()> {
    if body.len() > u32::MAX as usize {
        return Err(FrameError::FrameTooLarge {
            size: body.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(PREFIX_SIZE + body.len());
    dst.put_u32(body.len() as u32);
    dst.put_slice(body);
    Ok(())
}

/// Decode one frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// A zero-length frame decodes to `Some` of an empty body. On success the
/// frame bytes are consumed from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_frame: usize) -> Result<Option<Bytes>> {
    let Some(declared) = peek_length(src) else {
        return Ok(None);
    };

    if declared > max_frame {
        return Err(FrameError::FrameTooLarge {
            size: declared,
            max: max_frame,
        });
    }

    if src.len() < PREFIX_SIZE + declared {
        src.reserve(PREFIX_SIZE + declared - src.len());
        return Ok(None);
    }

    src.advance(PREFIX_SIZE);
    Ok(Some(src.split_to(declared).freeze()))
}

/// Build the error for a stream that ended with `pending` unconsumed bytes.
pub(crate) fn truncation(pending: &[u8]) -> FrameError {
    let expected = match peek_length(pending) {
        Some(declared) => PREFIX_SIZE + declared,
        None => PREFIX_SIZE,
    };
    FrameError::TruncatedMessage {
        expected,
        received: pending.len(),
    }
}

fn peek_length(src: &[u8]) -> Option<usize> {
    let prefix: [u8; PREFIX_SIZE] = src.get(..PREFIX_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix) as usize)
}

/// Configuration for the frame reader and writer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum frame body in bytes. Default: 16 MiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_big_endian() {
        let mut buf = BytesMut::new();
        encode_frame(&[0xAA; 258], &mut buf).unwrap();

        assert_eq!(&buf[..PREFIX_SIZE], &[0x00, 0x00, 0x01, 0x02]);
        assert_eq!(buf.len(), PREFIX_SIZE + 258);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello, pipecast!", &mut buf).unwrap();

        let body = decode_frame(&mut buf, DEFAULT_MAX_FRAME).unwrap().unwrap();

        assert_eq!(body.as_ref(), b"hello, pipecast!");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_prefix() {
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x01][..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_FRAME).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_decode_incomplete_body() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf).unwrap();
        buf.truncate(PREFIX_SIZE + 2);

        assert!(decode_frame(&mut buf, DEFAULT_MAX_FRAME).unwrap().is_none());
    }

    #[test]
    fn test_decode_frame_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32(32 * 1024 * 1024);

        let result = decode_frame(&mut buf, DEFAULT_MAX_FRAME);
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
    }

    #[test]
    fn zero_length_frame_decodes_to_empty_body() {
        let mut buf = BytesMut::new();
        buf.put_u32(0);
        encode_frame(b"next", &mut buf).unwrap();

        let empty = decode_frame(&mut buf, DEFAULT_MAX_FRAME).unwrap().unwrap();
        assert!(empty.is_empty());

        let next = decode_frame(&mut buf, DEFAULT_MAX_FRAME).unwrap().unwrap();
        assert_eq!(next.as_ref(), b"next");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(b"first", &mut buf).unwrap();
        encode_frame(b"second", &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, DEFAULT_MAX_FRAME).unwrap().unwrap();
        let f2 = decode_frame(&mut buf, DEFAULT_MAX_FRAME).unwrap().unwrap();

        assert_eq!(f1.as_ref(), b"first");
        assert_eq!(f2.as_ref(), b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn truncation_reports_declared_total() {
        let mut buf = BytesMut::new();
        encode_frame(b"0123456789", &mut buf).unwrap();

        match truncation(&buf[..7]) {
            FrameError::TruncatedMessage { expected, received } => {
                assert_eq!(expected, PREFIX_SIZE + 10);
                assert_eq!(received, 7);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        match truncation(&buf[..2]) {
            FrameError::TruncatedMessage { expected, received } => {
                assert_eq!(expected, PREFIX_SIZE);
                assert_eq!(received, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
