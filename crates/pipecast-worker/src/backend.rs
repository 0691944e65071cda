//! The seam between the worker and the real-time transport SDK.
//!
//! Everything here mirrors the small surface of a C-style media SDK: calls
//! return an integer result code where zero means success. [`check`] adapts
//! such a code into an [`RtcResult`].

use std::fmt;
use std::sync::Arc;

use pipecast_protocol::{SessionConfig, VideoConfig};

use crate::event::EventSender;

/// A non-zero result code from the transport SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RtcCode(pub i32);

impl fmt::Display for RtcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type RtcResult = Result<(), RtcCode>;

/// Turn a raw SDK return value into an [`RtcResult`].
pub fn check(code: i32) -> RtcResult {
    if code == 0 {
        Ok(())
    } else {
        Err(RtcCode(code))
    }
}

/// One planar 4:2:0 frame handed to the encoder.
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    pub buffer: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub timestamp_nanos: i64,
}

/// 10 ms of interleaved 16-bit PCM.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    pub buffer: &'a [u8],
    pub sample_rate: u32,
    pub channels: u32,
    pub timestamp_nanos: i64,
}

/// A live connection to one channel.
///
/// Calls may arrive from the command loop and the event pump at the same
/// time, so implementations must be internally synchronized.
pub trait RtcConnection: Send + Sync {
    fn connect(&self, token: &str, channel: &str, user_id: &str) -> RtcResult;

    fn set_video_encoder(&self, config: &VideoConfig) -> RtcResult;

    fn publish_audio(&self) -> RtcResult;

    fn publish_video(&self) -> RtcResult;

    fn unpublish_audio(&self) -> RtcResult;

    fn unpublish_video(&self) -> RtcResult;

    fn push_video_frame(&self, frame: &VideoFrame<'_>) -> RtcResult;

    fn push_audio_pcm(&self, frame: &AudioFrame<'_>) -> RtcResult;

    fn disconnect(&self) -> RtcResult;

    /// Free SDK resources. The connection is unusable afterwards.
    fn release(&self);
}

/// Process-wide SDK entry point.
pub trait RtcBackend: Send {
    /// Global SDK setup. Called once, before any connection exists.
    fn initialize(&self, config: &SessionConfig) -> RtcResult;

    /// Build a connection and register `events` as its lifecycle observer.
    fn create_connection(
        &self,
        config: &SessionConfig,
        events: EventSender,
    ) -> Result<Arc<dyn RtcConnection>, RtcCode>;

    /// Global SDK teardown.
    fn release(&self) {}
}
