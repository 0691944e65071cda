//! The single consumer of connection events.

use std::fmt;
use std::io::{self, Write};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use pipecast_protocol::{ConnectionStatus, LogLevel, LogResponse, StatusResponse, VideoConfig};

use crate::backend::{RtcCode, RtcConnection};
use crate::emitter::Emitter;
use crate::event::{report_for, ConnectionEvent, PumpCommand};
use crate::session::Session;
use crate::state::WorkerState;

pub(crate) fn spawn<W>(
    rx: Receiver<PumpCommand>,
    session: Arc<Session>,
    emitter: Emitter<W>,
) -> io::Result<JoinHandle<()>>
where
    W: Write + Send + 'static,
{
    thread::Builder::new()
        .name("pipecast-events".to_string())
        .spawn(move || {
            for command in rx {
                match command {
                    PumpCommand::Event(event) => handle_event(&session, &emitter, event),
                    PumpCommand::Stop => break,
                }
            }
            tracing::debug!("event pump stopped");
        })
}

pub(crate) fn handle_event<W: Write>(session: &Session, emitter: &Emitter<W>, event: ConnectionEvent) {
    if session.state() == WorkerState::Closed {
        tracing::debug!(?event, "session closed, ignoring connection event");
        return;
    }

    let mut report = report_for(&event);
    if let ConnectionEvent::Connected { .. } = event {
        let Some(connection) = session.connection() else {
            tracing::debug!("connected after teardown began, ignoring");
            return;
        };
        if let Err(failure) = publish_media(connection.as_ref(), &session.config.video) {
            tracing::error!(%failure, "media publish setup failed");
            report.status = Some(
                StatusResponse::new(ConnectionStatus::Failed, "failed to publish media")
                    .with_details(format!("MediaSetupError: {failure}")),
            );
            report.state = Some(WorkerState::Failed);
        }
    }

    if let Some(log) = report.log {
        trace_locally(&log);
        emitter.log_response(log);
    }
    if let Some(state) = report.state {
        session.set_state(state);
    }
    if let Some(status) = report.status {
        emitter.status(status);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PublishFailure {
    pub(crate) step: &'static str,
    pub(crate) code: RtcCode,
}

impl fmt::Display for PublishFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} returned {}", self.step, self.code)
    }
}

/// Configure the encoder, then publish audio and video.
///
/// If video fails after audio succeeded, audio is unpublished again so the
/// connection is never left half-published.
pub(crate) fn publish_media(
    connection: &dyn RtcConnection,
    video: &VideoConfig,
) -> Result<(), PublishFailure> {
    connection
        .set_video_encoder(video)
        .map_err(failed("set_video_encoder"))?;
    connection.publish_audio().map_err(failed("publish_audio"))?;
    if let Err(code) = connection.publish_video() {
        if let Err(undo) = connection.unpublish_audio() {
            tracing::warn!(code = %undo, "unpublish audio after failed video publish");
        }
        return Err(PublishFailure {
            step: "publish_video",
            code,
        });
    }
    Ok(())
}

fn failed(step: &'static str) -> impl FnOnce(RtcCode) -> PublishFailure {
    move |code| PublishFailure { step, code }
}

fn trace_locally(log: &LogResponse) {
    let message = log.message.as_str();
    match log.level {
        LogLevel::Debug => tracing::debug!("{message}"),
        LogLevel::Info => tracing::info!("{message}"),
        LogLevel::Warn => tracing::warn!("{message}"),
        LogLevel::Error => tracing::error!("{message}"),
    }
}
