use pipecast_protocol::{ConnectionStatus, LogLevel, Message, StatusResponse};

use crate::state::ConnectionState;

/// Act on one message from the worker's event stream.
///
/// Status responses update `state`; log responses are forwarded to the local
/// log at their own level. Returns the connected flag after the message.
pub fn dispatch(message: Message, state: &ConnectionState) -> bool {
    match message {
        Message::Status(status) => {
            let connected = state.apply(status.status);
            log_status(&status, connected);
            connected
        }
        Message::Log(log) => {
            let message = log.message.as_str();
            match log.level {
                LogLevel::Debug => tracing::debug!(source = "worker", "{message}"),
                LogLevel::Info => tracing::info!(source = "worker", "{message}"),
                LogLevel::Warn => tracing::warn!(source = "worker", "{message}"),
                LogLevel::Error => tracing::error!(source = "worker", "{message}"),
            }
            state.is_connected()
        }
        other => {
            tracing::warn!(kind = %other.kind(), "ignoring command-type message from worker");
            state.is_connected()
        }
    }
}

fn log_status(status: &StatusResponse, connected: bool) {
    // Token renewal details carry credential material.
    let details = match status.status {
        ConnectionStatus::TokenWillExpire => "<redacted>",
        _ => status.details.as_str(),
    };
    let kind = status.status.name();
    let message = status.message.as_str();

    match status.status {
        ConnectionStatus::InitializedFailure
        | ConnectionStatus::Failed
        | ConnectionStatus::ConnectionLost
        | ConnectionStatus::TokenExpired => {
            tracing::error!(source = "worker", status = kind, details, connected, "{message}")
        }
        ConnectionStatus::Disconnected
        | ConnectionStatus::Reconnecting
        | ConnectionStatus::TokenWillExpire => {
            tracing::warn!(source = "worker", status = kind, details, connected, "{message}")
        }
        _ => tracing::info!(source = "worker", status = kind, details, connected, "{message}"),
    }
}
