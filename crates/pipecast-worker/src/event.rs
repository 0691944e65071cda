//! Connection lifecycle events and what the worker reports for each.

use std::sync::mpsc::Sender;

use pipecast_protocol::{ConnectionStatus, LogLevel, LogResponse, StatusResponse};

use crate::state::WorkerState;

/// Lifecycle callbacks delivered by the transport SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connecting { reason: i32 },
    Connected { channel: String, user_id: String },
    Disconnected { reason: i32 },
    Reconnecting { reason: i32 },
    Reconnected { channel: String, user_id: String },
    ConnectionLost,
    ConnectionFailure { code: i32 },
    TokenWillExpire { token: String },
    TokenDidExpire,
    UserJoined { user_id: String },
    UserLeft { user_id: String, reason: i32 },
    Error { code: i32, message: String },
}

pub(crate) enum PumpCommand {
    Event(ConnectionEvent),
    Stop,
}

/// Observer handle given to the backend when a connection is created.
///
/// Callbacks may fire on any SDK thread; `emit` only enqueues. Events sent
/// after the worker has shut down are discarded.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<PumpCommand>,
}

impl EventSender {
    pub(crate) fn new(tx: Sender<PumpCommand>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: ConnectionEvent) {
        if self.tx.send(PumpCommand::Event(event)).is_err() {
            tracing::trace!("event pump gone, dropping connection event");
        }
    }
}

/// What the worker sends and where its session moves for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReport {
    pub log: Option<LogResponse>,
    pub status: Option<StatusResponse>,
    pub state: Option<WorkerState>,
}

impl EventReport {
    fn log_only(level: LogLevel, message: String) -> Self {
        Self {
            log: Some(LogResponse::new(level, message)),
            status: None,
            state: None,
        }
    }

    fn full(
        level: LogLevel,
        message: String,
        status: StatusResponse,
        state: WorkerState,
    ) -> Self {
        Self {
            log: Some(LogResponse::new(level, message)),
            status: Some(status),
            state: Some(state),
        }
    }
}

/// Map one lifecycle event to its outbound messages and next session state.
///
/// For [`ConnectionEvent::Connected`] the status is provisional: the pump
/// replaces it with a failure if publishing media does not succeed.
pub fn report_for(event: &ConnectionEvent) -> EventReport {
    match event {
        ConnectionEvent::Connecting { reason } => EventReport::full(
            LogLevel::Info,
            format!("connecting (reason {reason})"),
            StatusResponse::new(ConnectionStatus::Connecting, "connecting to channel"),
            WorkerState::Connecting,
        ),
        ConnectionEvent::Connected { channel, user_id } => EventReport::full(
            LogLevel::Info,
            format!("connected to {channel} as {user_id}"),
            StatusResponse::new(ConnectionStatus::Connected, "connected and publishing")
                .with_details(format!("channel={channel} user={user_id}")),
            WorkerState::Connected,
        ),
        ConnectionEvent::Disconnected { reason } => EventReport::full(
            LogLevel::Warn,
            format!("disconnected (reason {reason})"),
            StatusResponse::new(ConnectionStatus::Disconnected, "disconnected from channel")
                .with_details(format!("reason: {reason}")),
            WorkerState::Disconnected,
        ),
        ConnectionEvent::Reconnecting { reason } => EventReport::full(
            LogLevel::Warn,
            format!("reconnecting (reason {reason})"),
            StatusResponse::new(ConnectionStatus::Reconnecting, "connection interrupted, reconnecting")
                .with_details(format!("reason: {reason}")),
            WorkerState::Reconnecting,
        ),
        ConnectionEvent::Reconnected { channel, user_id } => EventReport::full(
            LogLevel::Info,
            format!("reconnected to {channel} as {user_id}"),
            StatusResponse::new(ConnectionStatus::Reconnected, "successfully reconnected"),
            WorkerState::Connected,
        ),
        ConnectionEvent::ConnectionLost => EventReport::full(
            LogLevel::Error,
            "connection lost".to_string(),
            StatusResponse::new(ConnectionStatus::Failed, "connection lost")
                .with_details("ConnectionLost"),
            WorkerState::Failed,
        ),
        ConnectionEvent::ConnectionFailure { code } => EventReport::full(
            LogLevel::Error,
            format!("connection failure, error code {code}"),
            StatusResponse::new(ConnectionStatus::Failed, "connection failure")
                .with_details(format!("error code: {code}")),
            WorkerState::Failed,
        ),
        ConnectionEvent::TokenWillExpire { token } => EventReport {
            log: Some(LogResponse::new(LogLevel::Warn, "token will expire soon")),
            status: Some(
                StatusResponse::new(ConnectionStatus::TokenWillExpire, "token will expire soon")
                    .with_details(token.clone()),
            ),
            state: None,
        },
        ConnectionEvent::TokenDidExpire => EventReport::full(
            LogLevel::Error,
            "token privilege did expire".to_string(),
            StatusResponse::new(ConnectionStatus::Failed, "token privilege did expire")
                .with_details("token expired"),
            WorkerState::Failed,
        ),
        ConnectionEvent::UserJoined { user_id } => {
            EventReport::log_only(LogLevel::Info, format!("user {user_id} joined"))
        }
        ConnectionEvent::UserLeft { user_id, reason } => {
            EventReport::log_only(LogLevel::Info, format!("user {user_id} left (reason {reason})"))
        }
        ConnectionEvent::Error { code, message } => {
            EventReport::log_only(LogLevel::Error, format!("transport error {code}: {message}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(event: ConnectionEvent) -> Option<ConnectionStatus> {
        report_for(&event).status.map(|s| s.status)
    }

    #[test]
    fn lifecycle_events_map_to_statuses() {
        assert_eq!(
            status_of(ConnectionEvent::Connecting { reason: 0 }),
            Some(ConnectionStatus::Connecting)
        );
        assert_eq!(
            status_of(ConnectionEvent::Connected {
                channel: "c".into(),
                user_id: "1".into()
            }),
            Some(ConnectionStatus::Connected)
        );
        assert_eq!(
            status_of(ConnectionEvent::Disconnected { reason: 3 }),
            Some(ConnectionStatus::Disconnected)
        );
        assert_eq!(
            status_of(ConnectionEvent::Reconnecting { reason: 2 }),
            Some(ConnectionStatus::Reconnecting)
        );
        assert_eq!(
            status_of(ConnectionEvent::ConnectionLost),
            Some(ConnectionStatus::Failed)
        );
        assert_eq!(
            status_of(ConnectionEvent::TokenDidExpire),
            Some(ConnectionStatus::Failed)
        );
    }

    #[test]
    fn connection_failure_carries_code() {
        let report = report_for(&ConnectionEvent::ConnectionFailure { code: 17 });
        let status = report.status.unwrap();
        assert_eq!(status.status, ConnectionStatus::Failed);
        assert_eq!(status.details, "error code: 17");
        assert_eq!(report.log.unwrap().level, LogLevel::Error);
        assert_eq!(report.state, Some(WorkerState::Failed));
    }

    #[test]
    fn token_warning_keeps_session_state() {
        let report = report_for(&ConnectionEvent::TokenWillExpire {
            token: "tok".into(),
        });
        assert_eq!(report.log.unwrap().level, LogLevel::Warn);
        let status = report.status.unwrap();
        assert_eq!(status.status, ConnectionStatus::TokenWillExpire);
        assert_eq!(status.details, "tok");
        assert_eq!(report.state, None);
    }

    #[test]
    fn expired_token_details() {
        let status = report_for(&ConnectionEvent::TokenDidExpire).status.unwrap();
        assert_eq!(status.details, "token expired");
    }

    #[test]
    fn peer_and_error_events_log_only() {
        for event in [
            ConnectionEvent::UserJoined { user_id: "7".into() },
            ConnectionEvent::UserLeft {
                user_id: "7".into(),
                reason: 0,
            },
            ConnectionEvent::Error {
                code: 5,
                message: "boom".into(),
            },
        ] {
            let report = report_for(&event);
            assert!(report.log.is_some(), "{event:?}");
            assert!(report.status.is_none(), "{event:?}");
            assert!(report.state.is_none(), "{event:?}");
        }
    }

    #[test]
    fn reconnect_returns_to_connected_state() {
        let report = report_for(&ConnectionEvent::Reconnected {
            channel: "c".into(),
            user_id: "1".into(),
        });
        assert_eq!(report.state, Some(WorkerState::Connected));
        assert_eq!(
            report.status.unwrap().status,
            ConnectionStatus::Reconnected
        );
    }

    #[test]
    fn emit_after_pump_gone_is_silent() {
        let (tx, rx) = std::sync::mpsc::channel();
        drop(rx);
        EventSender::new(tx).emit(ConnectionEvent::ConnectionLost);
    }
}
