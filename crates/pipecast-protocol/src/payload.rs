//! Payload variants and their byte layouts.
//!
//! All integers are big-endian. Strings are a `u32` byte length followed by
//! UTF-8 bytes.
//!
//! ```text
//! MediaSample:    timestamp_nanos (i64) | data (rest of payload)
//! StatusResponse: status (u8) | message (str) | details (str)
//! LogResponse:    level (u8)  | message (str)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::status::{ConnectionStatus, LogLevel};

/// One raw media frame plus its presentation timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSample {
    pub data: Bytes,
    pub timestamp_nanos: i64,
}

impl MediaSample {
    pub fn new(data: impl Into<Bytes>, timestamp_nanos: i64) -> Self {
        Self {
            data: data.into(),
            timestamp_nanos,
        }
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(8 + self.data.len());
        dst.put_i64(self.timestamp_nanos);
        dst.put_slice(&self.data);
    }

    pub(crate) fn decode(mut src: Bytes) -> Result<Self> {
        if src.remaining() < 8 {
            return Err(ProtocolError::malformed("media sample", "missing timestamp"));
        }
        let timestamp_nanos = src.get_i64();
        Ok(Self {
            data: src,
            timestamp_nanos,
        })
    }
}

/// A connection-state report from the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: ConnectionStatus,
    pub message: String,
    pub details: String,
}

impl StatusResponse {
    pub fn new(status: ConnectionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: String::new(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.status.to_wire());
        put_str(dst, &self.message);
        put_str(dst, &self.details);
    }

    pub(crate) fn decode(mut src: Bytes) -> Result<Self> {
        const WHAT: &str = "status response";
        if !src.has_remaining() {
            return Err(ProtocolError::malformed(WHAT, "empty payload"));
        }
        let status = ConnectionStatus::from_wire(src.get_u8())
            .ok_or_else(|| ProtocolError::malformed(WHAT, "unknown status"))?;
        let message = get_str(&mut src, WHAT)?;
        let details = get_str(&mut src, WHAT)?;
        Ok(Self {
            status,
            message,
            details,
        })
    }
}

/// A human-readable diagnostic line from the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogResponse {
    pub level: LogLevel,
    pub message: String,
}

impl LogResponse {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.level.to_wire());
        put_str(dst, &self.message);
    }

    pub(crate) fn decode(mut src: Bytes) -> Result<Self> {
        const WHAT: &str = "log response";
        if !src.has_remaining() {
            return Err(ProtocolError::malformed(WHAT, "empty payload"));
        }
        let level = LogLevel::from_wire(src.get_u8())
            .ok_or_else(|| ProtocolError::malformed(WHAT, "unknown level"))?;
        let message = get_str(&mut src, WHAT)?;
        Ok(Self { level, message })
    }
}

fn put_str(dst: &mut BytesMut, value: &str) {
    dst.put_u32(value.len() as u32);
    dst.put_slice(value.as_bytes());
}

fn get_str(src: &mut Bytes, what: &'static str) -> Result<String> {
    if src.remaining() < 4 {
        return Err(ProtocolError::malformed(what, "missing string length"));
    }
    let len = src.get_u32() as usize;
    if src.remaining() < len {
        return Err(ProtocolError::malformed(what, "string runs past payload"));
    }
    let raw = src.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::malformed(what, "invalid UTF-8"))
}
