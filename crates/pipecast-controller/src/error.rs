use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur while driving a worker.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Spawning or reaping the worker failed.
    #[error("transport error: {0}")]
    Transport(#[from] pipecast_transport::TransportError),

    /// Encoding or writing a command failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] pipecast_protocol::ProtocolError),

    /// The worker did not report a connection in time.
    #[error("worker did not connect within {0:?}")]
    ConnectTimeout(Duration),

    /// The worker's event stream ended before it connected.
    #[error("worker exited before connecting")]
    WorkerExited,

    /// Shutdown began while waiting.
    #[error("controller is shutting down")]
    Closing,

    /// A media source file could not be opened or read.
    #[error("media source {path}: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading the next frame from an open source failed.
    #[error("reading {kind} source: {source}")]
    Read {
        kind: pipecast_protocol::MediaKind,
        #[source]
        source: std::io::Error,
    },

    /// A background thread could not be started.
    #[error("failed to start {name} thread: {source}")]
    Thread {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ControllerError>;
