use std::fmt;

use pipecast_protocol::ProtocolError;

use crate::backend::RtcCode;

/// The start-up step that failed before the command loop could run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    Initialize,
    CreateConnection,
    Connect,
}

impl SetupStep {
    /// Detail string reported in the `initialized-failure` status.
    pub fn detail(self) -> &'static str {
        match self {
            SetupStep::Initialize => "GlobalInitializeFailed",
            SetupStep::CreateConnection => "NewConnectionFailed",
            SetupStep::Connect => "ConnectFailed",
        }
    }
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SetupStep::Initialize => "global initialize",
            SetupStep::CreateConnection => "connection construction",
            SetupStep::Connect => "connect call",
        })
    }
}

/// Errors that end a worker session.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The transport collaborator refused a setup step.
    #[error("{step} failed with code {code}")]
    Setup { step: SetupStep, code: RtcCode },

    /// The session configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(ProtocolError),

    /// The input stream broke mid-message.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The event pump thread could not be started.
    #[error("failed to start event pump: {0}")]
    Pump(std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
