use std::fmt;
use std::io;

use pipecast_controller::ControllerError;
use pipecast_frame::FrameError;
use pipecast_protocol::ProtocolError;
use pipecast_transport::TransportError;
use pipecast_worker::WorkerError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => USAGE,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Spawn { program, source } => io_error(
            &format!("{context}: cannot start {}", program.display()),
            source,
        ),
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::FrameTooLarge { .. } | FrameError::TruncatedMessage { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::StreamClosed | FrameError::BrokenPipe => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

pub fn protocol_error(context: &str, err: ProtocolError) -> CliError {
    match err {
        ProtocolError::Frame(err) => frame_error(context, err),
        ProtocolError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        ProtocolError::SinkClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn controller_error(context: &str, err: ControllerError) -> CliError {
    match err {
        ControllerError::Transport(err) => transport_error(context, err),
        ControllerError::Protocol(err) => protocol_error(context, err),
        ControllerError::ConnectTimeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ControllerError::Source { path, source } => {
            io_error(&format!("{context}: {}", path.display()), source)
        }
        ControllerError::Read { source, .. } => io_error(context, source),
        ControllerError::WorkerExited | ControllerError::Closing => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        ControllerError::Thread { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn worker_error(context: &str, err: WorkerError) -> CliError {
    match err {
        WorkerError::Setup { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        WorkerError::Config(err) => protocol_error(context, err),
        WorkerError::Protocol(err) => protocol_error(context, err),
        WorkerError::Pump(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn timeouts_map_to_timeout_code() {
        let err = controller_error(
            "connect",
            ControllerError::ConnectTimeout(Duration::from_secs(30)),
        );
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn missing_media_file_is_a_usage_error() {
        let err = controller_error(
            "open audio",
            ControllerError::Source {
                path: "/nope.pcm".into(),
                source: io::Error::from(io::ErrorKind::NotFound),
            },
        );
        assert_eq!(err.code, USAGE);
        assert!(err.message.contains("/nope.pcm"));
    }

    #[test]
    fn worker_setup_failure_exits_one() {
        let err = worker_error(
            "worker",
            WorkerError::Setup {
                step: pipecast_worker::SetupStep::Connect,
                code: pipecast_worker::RtcCode(-2),
            },
        );
        assert_eq!(err.code, FAILURE);
    }

    #[test]
    fn invalid_config_is_usage() {
        let err = worker_error(
            "worker",
            WorkerError::Config(ProtocolError::InvalidConfig("bad".into())),
        );
        assert_eq!(err.code, USAGE);
    }
}
