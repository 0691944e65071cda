use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Subcommand};
use pipecast_protocol::{AudioConfig, SessionConfig, VideoCodec, VideoConfig};

use crate::exit::{CliError, CliResult, USAGE};
use crate::logging::{LogFormat, LogLevel};
use crate::output::OutputFormat;

pub mod stream;
pub mod version;
pub mod worker;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pace raw audio and video files into a worker until stopped.
    Stream(StreamArgs),
    /// Run the worker side: read commands on stdin, report on stdout.
    Worker(WorkerArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings the CLI passes down to subcommands that spawn children.
#[derive(Debug, Clone, Copy)]
pub struct Globals {
    pub format: OutputFormat,
    pub log_format: LogFormat,
    pub log_level: LogLevel,
}

pub fn run(command: Command, globals: Globals) -> CliResult<i32> {
    match command {
        Command::Stream(args) => stream::run(args, globals),
        Command::Worker(args) => worker::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Connection and media parameters shared by both sides.
///
/// These flags are exactly what the controller renders when it starts a
/// worker, so the two must stay in sync.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Transport application id.
    #[arg(long, env = "PIPECAST_APP_ID")]
    pub app_id: String,
    /// Channel to join.
    #[arg(long)]
    pub channel_name: String,
    /// User id to join as.
    #[arg(long, default_value = "100")]
    pub user_id: String,
    /// Access token (empty for token-less projects).
    #[arg(long, env = "PIPECAST_TOKEN", default_value = "", hide_env_values = true)]
    pub token: String,
    /// Video width in pixels.
    #[arg(long, default_value_t = 352)]
    pub width: u32,
    /// Video height in pixels.
    #[arg(long, default_value_t = 288)]
    pub height: u32,
    /// Video frames per second.
    #[arg(long, default_value_t = 15)]
    pub frame_rate: u32,
    /// Video codec: H264, VP8 or AV1. Anything else falls back to H264.
    #[arg(long, default_value = "H264")]
    pub video_codec: String,
    /// Audio sample rate in Hz.
    #[arg(long, default_value_t = 16_000)]
    pub sample_rate: u32,
    /// Audio channel count.
    #[arg(long, default_value_t = 1)]
    pub audio_channels: u32,
    /// Target video bitrate in Kbps.
    #[arg(long, default_value_t = 1000)]
    pub bitrate: u32,
    /// Minimum video bitrate in Kbps.
    #[arg(long, default_value_t = 100)]
    pub min_bitrate: u32,
    /// Treat the user id as a string account rather than a numeric uid.
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub enable_string_uid: bool,
}

impl SessionArgs {
    /// Build the session config. Validation is left to whoever consumes it,
    /// so the worker can still report a bad config over the protocol.
    pub fn into_config(self) -> SessionConfig {
        let mut video = VideoConfig {
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
            codec: VideoCodec::parse_lossy(&self.video_codec),
            bitrate_kbps: self.bitrate,
            min_bitrate_kbps: self.min_bitrate,
        };
        video.apply_codec_defaults();

        SessionConfig {
            app_id: self.app_id,
            channel_name: self.channel_name,
            user_id: self.user_id,
            token: self.token,
            video,
            audio: AudioConfig {
                sample_rate: self.sample_rate,
                channels: self.audio_channels,
            },
            enable_string_uid: self.enable_string_uid,
        }
    }
}

#[derive(Args, Debug)]
pub struct StreamArgs {
    #[command(flatten)]
    pub session: SessionArgs,
    /// Raw interleaved 16-bit little-endian PCM file.
    #[arg(long, value_name = "FILE")]
    pub audio_file: PathBuf,
    /// Raw planar YUV 4:2:0 file.
    #[arg(long, value_name = "FILE")]
    pub video_file: PathBuf,
    /// How long to wait for the worker to connect (e.g. 30s, 500ms).
    #[arg(long, default_value = "30s")]
    pub connect_timeout: String,
    /// Stop after streaming for this long. Default: until interrupted.
    #[arg(long)]
    pub duration: Option<String>,
    /// Worker executable. Default: this binary's `worker` subcommand.
    #[arg(long, value_name = "PATH")]
    pub worker_program: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub session: SessionArgs,
    /// Delay before the simulated transport reports a connection.
    #[arg(long, default_value = "50ms")]
    pub sim_connect_delay: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
