use std::path::PathBuf;

/// Errors that can occur while managing the worker's byte streams.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The worker executable could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    /// A standard stream of the child was not captured as a pipe.
    #[error("worker {0} was not captured as a pipe")]
    MissingPipe(&'static str),

    /// Redirecting the process stdout away from the protocol stream failed.
    #[error("failed to reserve stdout for protocol use: {0}")]
    Redirect(std::io::Error),

    /// Stdout reservation needs POSIX descriptor duplication.
    #[error("stdout reservation is not supported on this platform")]
    Unsupported,

    /// An I/O error occurred on a process handle.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
