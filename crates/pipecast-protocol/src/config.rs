//! Session configuration shared by the controller and the worker.
//!
//! The controller renders a [`SessionConfig`] into worker command-line flags
//! with [`SessionConfig::to_worker_args`]; the worker CLI parses the same
//! flags back. Frame sizes derived here are the only valid `MediaSample`
//! lengths for a session.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::{ProtocolError, Result};
use crate::kind::MessageKind;

/// Audio frames always cover 10 ms.
pub const AUDIO_FRAME_DURATION: Duration = Duration::from_millis(10);

const BYTES_PER_PCM16_SAMPLE: usize = 2;

/// The two media streams of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// The command that carries a sample of this kind.
    pub fn message_kind(self) -> MessageKind {
        match self {
            MediaKind::Audio => MessageKind::WriteAudioSample,
            MediaKind::Video => MessageKind::WriteVideoSample,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video codec requested from the transport's encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum VideoCodec {
    #[default]
    H264,
    Vp8,
    Av1,
}

impl VideoCodec {
    pub fn as_str(self) -> &'static str {
        match self {
            VideoCodec::H264 => "H264",
            VideoCodec::Vp8 => "VP8",
            VideoCodec::Av1 => "AV1",
        }
    }

    /// Parse a codec name, falling back to H264 on anything unrecognized.
    pub fn parse_lossy(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            tracing::warn!(codec = name, "unsupported video codec, defaulting to H264");
            VideoCodec::H264
        })
    }
}

impl FromStr for VideoCodec {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "H264" => Ok(VideoCodec::H264),
            "VP8" => Ok(VideoCodec::Vp8),
            "AV1" => Ok(VideoCodec::Av1),
            _ => Err(ProtocolError::InvalidConfig(format!(
                "unknown video codec '{s}' (expected H264, VP8 or AV1)"
            ))),
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw 4:2:0 video stream parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub codec: VideoCodec,
    /// Target bitrate in Kbps.
    pub bitrate_kbps: u32,
    /// Minimum bitrate in Kbps.
    pub min_bitrate_kbps: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 352,
            height: 288,
            frame_rate: 15,
            codec: VideoCodec::H264,
            bitrate_kbps: 1000,
            min_bitrate_kbps: 100,
        }
    }
}

impl VideoConfig {
    /// Bytes in one planar 4:2:0 frame: a full-size Y plane plus quarter-size U and V.
    pub fn frame_size(&self) -> usize {
        let luma = self.width as usize * self.height as usize;
        luma + 2 * (luma / 4)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }

    /// Raise bitrates that are too low for the selected codec.
    ///
    /// AV1 needs at least 1500 Kbps target and 500 Kbps minimum to encode in
    /// real time.
    pub fn apply_codec_defaults(&mut self) {
        if self.codec != VideoCodec::Av1 {
            return;
        }
        if self.bitrate_kbps < 1500 {
            tracing::info!(from = self.bitrate_kbps, to = 1500, "raising bitrate for AV1");
            self.bitrate_kbps = 1500;
        }
        if self.min_bitrate_kbps < 500 {
            tracing::info!(from = self.min_bitrate_kbps, to = 500, "raising min bitrate for AV1");
            self.min_bitrate_kbps = 500;
        }
    }
}

/// Interleaved little-endian 16-bit PCM stream parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
        }
    }
}

impl AudioConfig {
    /// Bytes in one 10 ms frame.
    pub fn frame_size(&self) -> usize {
        (self.sample_rate as usize / 100) * self.channels as usize * BYTES_PER_PCM16_SAMPLE
    }

    pub fn frame_interval(&self) -> Duration {
        AUDIO_FRAME_DURATION
    }
}

/// Everything the worker needs to open and publish one connection.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub app_id: String,
    pub channel_name: String,
    pub user_id: String,
    /// Credential material; redacted in debug output.
    pub token: String,
    pub video: VideoConfig,
    pub audio: AudioConfig,
    pub enable_string_uid: bool,
}

impl SessionConfig {
    pub fn new(app_id: impl Into<String>, channel_name: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            channel_name: channel_name.into(),
            user_id: "100".to_string(),
            token: String::new(),
            video: VideoConfig::default(),
            audio: AudioConfig::default(),
            enable_string_uid: false,
        }
    }

    /// Reject parameters that would make frame sizes or pacing meaningless.
    pub fn validate(&self) -> Result<()> {
        let video = &self.video;
        if video.width == 0 || video.height == 0 {
            return Err(ProtocolError::InvalidConfig(
                "video resolution must be non-zero".to_string(),
            ));
        }
        if video.width % 2 != 0 || video.height % 2 != 0 {
            return Err(ProtocolError::InvalidConfig(format!(
                "4:2:0 video needs even dimensions, got {}x{}",
                video.width, video.height
            )));
        }
        if !(1..=120).contains(&video.frame_rate) {
            return Err(ProtocolError::InvalidConfig(format!(
                "frame rate {} outside 1..=120",
                video.frame_rate
            )));
        }
        if video.min_bitrate_kbps > video.bitrate_kbps {
            return Err(ProtocolError::InvalidConfig(format!(
                "min bitrate {} exceeds bitrate {}",
                video.min_bitrate_kbps, video.bitrate_kbps
            )));
        }
        if self.audio.sample_rate == 0 || self.audio.sample_rate % 100 != 0 {
            return Err(ProtocolError::InvalidConfig(format!(
                "sample rate {} does not divide into 10 ms frames",
                self.audio.sample_rate
            )));
        }
        if self.audio.channels == 0 {
            return Err(ProtocolError::InvalidConfig(
                "audio needs at least one channel".to_string(),
            ));
        }
        Ok(())
    }

    /// Frame size for one stream of this session.
    pub fn frame_size(&self, kind: MediaKind) -> usize {
        match kind {
            MediaKind::Audio => self.audio.frame_size(),
            MediaKind::Video => self.video.frame_size(),
        }
    }

    /// Check that a sample carries exactly one frame for its stream.
    pub fn check_sample_len(&self, kind: MediaKind, len: usize) -> Result<()> {
        let expected = self.frame_size(kind);
        if len != expected {
            return Err(ProtocolError::SampleSize {
                kind,
                expected,
                actual: len,
            });
        }
        Ok(())
    }

    /// Render this config as worker command-line flags.
    pub fn to_worker_args(&self) -> Vec<String> {
        vec![
            "--app-id".to_string(),
            self.app_id.clone(),
            "--channel-name".to_string(),
            self.channel_name.clone(),
            "--user-id".to_string(),
            self.user_id.clone(),
            "--token".to_string(),
            self.token.clone(),
            "--width".to_string(),
            self.video.width.to_string(),
            "--height".to_string(),
            self.video.height.to_string(),
            "--frame-rate".to_string(),
            self.video.frame_rate.to_string(),
            "--video-codec".to_string(),
            self.video.codec.to_string(),
            "--sample-rate".to_string(),
            self.audio.sample_rate.to_string(),
            "--audio-channels".to_string(),
            self.audio.channels.to_string(),
            "--bitrate".to_string(),
            self.video.bitrate_kbps.to_string(),
            "--min-bitrate".to_string(),
            self.video.min_bitrate_kbps.to_string(),
            "--enable-string-uid".to_string(),
            self.enable_string_uid.to_string(),
        ]
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("app_id", &self.app_id)
            .field("channel_name", &self.channel_name)
            .field("user_id", &self.user_id)
            .field("token", &format_args!("<redacted:{} bytes>", self.token.len()))
            .field("video", &self.video)
            .field("audio", &self.audio)
            .field("enable_string_uid", &self.enable_string_uid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cif_frame_sizes() {
        let config = SessionConfig::new("app", "room");
        assert_eq!(config.frame_size(MediaKind::Video), 152_064);
        assert_eq!(config.frame_size(MediaKind::Audio), 320);
        assert_eq!(config.video.frame_interval(), Duration::from_nanos(66_666_666));
    }

    #[test]
    fn stereo_48k_audio_frame() {
        let audio = AudioConfig {
            sample_rate: 48_000,
            channels: 2,
        };
        assert_eq!(audio.frame_size(), 1920);
    }

    #[test]
    fn codec_parse_is_case_insensitive_and_lossy() {
        assert_eq!("vp8".parse::<VideoCodec>().unwrap(), VideoCodec::Vp8);
        assert_eq!(VideoCodec::parse_lossy("AV1"), VideoCodec::Av1);
        assert_eq!(VideoCodec::parse_lossy("HEVC"), VideoCodec::H264);
    }

    #[test]
    fn av1_raises_low_bitrates_only() {
        let mut video = VideoConfig {
            codec: VideoCodec::Av1,
            ..VideoConfig::default()
        };
        video.apply_codec_defaults();
        assert_eq!((video.bitrate_kbps, video.min_bitrate_kbps), (1500, 500));

        let mut generous = VideoConfig {
            codec: VideoCodec::Av1,
            bitrate_kbps: 4000,
            min_bitrate_kbps: 900,
            ..VideoConfig::default()
        };
        generous.apply_codec_defaults();
        assert_eq!((generous.bitrate_kbps, generous.min_bitrate_kbps), (4000, 900));

        let mut h264 = VideoConfig::default();
        h264.apply_codec_defaults();
        assert_eq!(h264.bitrate_kbps, 1000);
    }

    #[test]
    fn validate_rejects_unusable_configs() {
        let mut config = SessionConfig::new("app", "room");
        assert!(config.validate().is_ok());

        config.video.width = 351;
        assert!(config.validate().is_err());
        config.video.width = 352;

        config.video.frame_rate = 0;
        assert!(config.validate().is_err());
        config.video.frame_rate = 15;

        config.audio.sample_rate = 44_101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn sample_len_check_names_the_stream() {
        let config = SessionConfig::new("app", "room");
        assert!(config.check_sample_len(MediaKind::Audio, 320).is_ok());

        let err = config.check_sample_len(MediaKind::Video, 100).unwrap_err();
        assert_eq!(err.to_string(), "video sample is 100 bytes, expected 152064");
    }

    #[test]
    fn worker_args_pair_flags_with_values() {
        let mut config = SessionConfig::new("app-1", "room");
        config.token = "secret".to_string();
        config.enable_string_uid = true;

        let args = config.to_worker_args();
        assert_eq!(args.len() % 2, 0);
        let pairs: Vec<_> = args.chunks(2).map(|p| (p[0].as_str(), p[1].as_str())).collect();
        assert!(pairs.contains(&("--app-id", "app-1")));
        assert!(pairs.contains(&("--video-codec", "H264")));
        assert!(pairs.contains(&("--enable-string-uid", "true")));
    }

    #[test]
    fn debug_redacts_token() {
        let mut config = SessionConfig::new("app", "room");
        config.token = "very-secret".to_string();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("<redacted:11 bytes>"));
    }
}
