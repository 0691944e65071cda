//! The worker's command loop.

use std::fmt;
use std::io::{Read, Write};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use pipecast_protocol::{
    ConnectionStatus, EnvelopeReader, EnvelopeSink, LogLevel, MediaKind, MediaSample, Message,
    ProtocolError, SessionConfig, StatusResponse,
};

use crate::backend::{AudioFrame, RtcBackend, RtcCode, RtcConnection, VideoFrame};
use crate::emitter::Emitter;
use crate::error::{Result, SetupStep, WorkerError};
use crate::event::{EventSender, PumpCommand};
use crate::pump;
use crate::session::Session;
use crate::state::WorkerState;

/// Why [`WorkerRuntime::run`] returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The controller sent a close command.
    Closed,
    /// The controller closed the input stream.
    InputClosed,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExitReason::Closed => "closed by controller",
            ExitReason::InputClosed => "input closed",
        })
    }
}

/// Wrong-sized samples between repeated warnings after the first.
const REJECT_WARN_INTERVAL: u64 = 1000;

fn reports_rejection(rejected: u64) -> bool {
    rejected == 1 || rejected % REJECT_WARN_INTERVAL == 0
}

/// Per-session frame counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PushStats {
    pub video_frames: u64,
    pub audio_frames: u64,
    /// Pushes the transport refused.
    pub push_failures: u64,
    /// Samples that arrived with no live connection.
    pub dropped: u64,
    /// Samples of the wrong size.
    pub rejected: u64,
}

/// A started worker: connection requested, ready to take commands.
pub struct WorkerRuntime<R, W> {
    session: Arc<Session>,
    backend: Box<dyn RtcBackend>,
    input: EnvelopeReader<R>,
    emitter: Emitter<W>,
    pump_tx: Sender<PumpCommand>,
    pump: Option<JoinHandle<()>>,
    stats: PushStats,
}

impl<R, W> WorkerRuntime<R, W>
where
    R: Read,
    W: Write + Send + 'static,
{
    /// Initialize the SDK, create the connection and issue the connect call.
    ///
    /// Reports `initialized-success` before returning, so the controller
    /// always sees it ahead of any lifecycle status. On failure an
    /// `initialized-failure` status naming the failed step has already been
    /// sent and the worker should exit.
    pub fn start(
        config: SessionConfig,
        backend: Box<dyn RtcBackend>,
        input: R,
        output: W,
    ) -> Result<Self> {
        let emitter = Emitter::new(EnvelopeSink::new(output));

        if let Err(err) = config.validate() {
            emitter.status(
                StatusResponse::new(ConnectionStatus::InitializedFailure, "invalid configuration")
                    .with_details(err.to_string()),
            );
            return Err(WorkerError::Config(err));
        }

        let session = Arc::new(Session::new(config));
        let cfg = &session.config;

        if let Err(code) = backend.initialize(cfg) {
            return Err(setup_failed(&emitter, SetupStep::Initialize, code));
        }

        let (pump_tx, pump_rx) = mpsc::channel();
        let connection = match backend.create_connection(cfg, EventSender::new(pump_tx.clone())) {
            Ok(connection) => connection,
            Err(code) => {
                backend.release();
                return Err(setup_failed(&emitter, SetupStep::CreateConnection, code));
            }
        };
        session.attach(Arc::clone(&connection));
        session.set_state(WorkerState::Connecting);

        if let Err(code) = connection.connect(&cfg.token, &cfg.channel_name, &cfg.user_id) {
            session.detach();
            connection.release();
            backend.release();
            return Err(setup_failed(&emitter, SetupStep::Connect, code));
        }

        tracing::info!(
            channel = %cfg.channel_name,
            user_id = %cfg.user_id,
            codec = %cfg.video.codec,
            "connect issued, awaiting connected callback"
        );
        emitter.status(
            StatusResponse::new(ConnectionStatus::InitializedSuccess, "connection initialized")
                .with_details(format!("codec={}", cfg.video.codec)),
        );

        let pump = match pump::spawn(pump_rx, Arc::clone(&session), emitter.clone()) {
            Ok(handle) => handle,
            Err(err) => {
                teardown(&session, backend.as_ref());
                emitter.status(
                    StatusResponse::new(ConnectionStatus::Failed, "event pump unavailable")
                        .with_details(err.to_string()),
                );
                return Err(WorkerError::Pump(err));
            }
        };

        Ok(Self {
            session,
            backend,
            input: EnvelopeReader::new(input),
            emitter,
            pump_tx,
            pump: Some(pump),
            stats: PushStats::default(),
        })
    }

    pub fn state(&self) -> WorkerState {
        self.session.state()
    }

    pub fn stats(&self) -> PushStats {
        self.stats
    }

    /// Process commands until close, end of input, or a broken input stream.
    ///
    /// Resources are released on every path. Only a close command produces
    /// the final `disconnected` status; when the controller has hung up
    /// nothing more is written.
    pub fn run(mut self) -> Result<(ExitReason, PushStats)> {
        let outcome = loop {
            let envelope = match self.input.read_envelope() {
                Ok(Some(envelope)) => envelope,
                Ok(None) => {
                    tracing::trace!("skipping zero-length frame");
                    continue;
                }
                Err(err) if err.is_stream_closed() => {
                    tracing::info!("controller closed input");
                    self.emitter.mute();
                    break Ok(ExitReason::InputClosed);
                }
                Err(err @ ProtocolError::Malformed { .. }) => {
                    self.malformed(&err);
                    continue;
                }
                Err(err) => {
                    tracing::error!(error = %err, "input stream corrupted");
                    self.emitter.mute();
                    break Err(WorkerError::Protocol(err));
                }
            };

            match Message::from_envelope(&envelope) {
                Ok(Message::WriteVideoSample(sample)) => self.push(MediaKind::Video, &sample),
                Ok(Message::WriteAudioSample(sample)) => self.push(MediaKind::Audio, &sample),
                Ok(Message::Close) => {
                    tracing::info!("close requested by controller");
                    break Ok(ExitReason::Closed);
                }
                Ok(other) => self.unhandled(other.kind().name().to_string()),
                Err(ProtocolError::UnknownMessageType(tag)) => self.unhandled(tag.to_string()),
                Err(err) => self.malformed(&err),
            }
        };

        self.shutdown();
        tracing::info!(
            video_frames = self.stats.video_frames,
            audio_frames = self.stats.audio_frames,
            push_failures = self.stats.push_failures,
            dropped = self.stats.dropped,
            rejected = self.stats.rejected,
            "worker session ended"
        );

        if let Ok(ExitReason::Closed) = outcome {
            self.emitter.log(LogLevel::Info, "worker shutting down");
            self.emitter.status(
                StatusResponse::new(ConnectionStatus::Disconnected, "disconnected")
                    .with_details("closed by controller"),
            );
        }
        outcome.map(|reason| (reason, self.stats))
    }

    fn push(&mut self, kind: MediaKind, sample: &MediaSample) {
        let Some(connection) = self.session.connection() else {
            self.stats.dropped += 1;
            return;
        };
        let config = &self.session.config;
        if let Err(err) = config.check_sample_len(kind, sample.data.len()) {
            self.stats.rejected += 1;
            if reports_rejection(self.stats.rejected) {
                tracing::warn!(
                    error = %err,
                    rejected = self.stats.rejected,
                    "dropping sample"
                );
            }
            return;
        }

        let result = match kind {
            MediaKind::Video => connection.push_video_frame(&VideoFrame {
                buffer: &sample.data,
                width: config.video.width,
                height: config.video.height,
                timestamp_nanos: sample.timestamp_nanos,
            }),
            MediaKind::Audio => connection.push_audio_pcm(&AudioFrame {
                buffer: &sample.data,
                sample_rate: config.audio.sample_rate,
                channels: config.audio.channels,
                timestamp_nanos: sample.timestamp_nanos,
            }),
        };

        match result {
            Ok(()) => match kind {
                MediaKind::Video => self.stats.video_frames += 1,
                MediaKind::Audio => self.stats.audio_frames += 1,
            },
            Err(code) => {
                self.stats.push_failures += 1;
                tracing::trace!(%kind, %code, "push refused");
            }
        }
    }

    fn malformed(&self, err: &ProtocolError) {
        tracing::warn!(error = %err, "skipping malformed message");
        self.emitter
            .log(LogLevel::Error, format!("malformed message: {err}"));
    }

    /// Report a command type the worker does not handle. The loop continues.
    fn unhandled(&self, kind: String) {
        tracing::warn!(%kind, "unhandled message type");
        self.emitter.status(
            StatusResponse::new(
                ConnectionStatus::Failed,
                format!("unknown command type received: {kind}"),
            )
            .with_details("ProtocolViolation"),
        );
    }

    fn shutdown(&mut self) {
        teardown(&self.session, self.backend.as_ref());
        if self.pump_tx.send(PumpCommand::Stop).is_ok() {
            if let Some(handle) = self.pump.take() {
                if handle.join().is_err() {
                    tracing::error!("event pump panicked");
                }
            }
        }
    }
}

/// Close the session, detach and release the connection, then the SDK.
fn teardown(session: &Session, backend: &dyn RtcBackend) {
    session.set_state(WorkerState::Closed);
    if let Some(connection) = session.detach() {
        release_connection(connection.as_ref());
    }
    backend.release();
}

fn release_connection(connection: &dyn RtcConnection) {
    for (step, result) in [
        ("unpublish_audio", connection.unpublish_audio()),
        ("unpublish_video", connection.unpublish_video()),
        ("disconnect", connection.disconnect()),
    ] {
        if let Err(code) = result {
            tracing::debug!(step, %code, "cleanup step failed");
        }
    }
    connection.release();
}

fn setup_failed<W: Write>(emitter: &Emitter<W>, step: SetupStep, code: RtcCode) -> WorkerError {
    tracing::error!(%step, %code, "worker setup failed");
    emitter.status(
        StatusResponse::new(
            ConnectionStatus::InitializedFailure,
            format!("{step} failed with code {code}"),
        )
        .with_details(step.detail()),
    );
    WorkerError::Setup { step, code }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::Duration;

    use pipecast_protocol::{Envelope, EnvelopeReader, MessageKind};

    use super::*;
    use crate::event::ConnectionEvent;
    use crate::sim::{SimulatedBackend, SimulatedCall};

    fn config() -> SessionConfig {
        SessionConfig::new("app", "room")
    }

    fn wire(messages: &[Message]) -> Vec<u8> {
        let sink = EnvelopeSink::new(Cursor::new(Vec::new()));
        for message in messages {
            sink.send(message).unwrap();
        }
        sink.close().unwrap().into_inner()
    }

    fn decode_all(bytes: Vec<u8>) -> Vec<Message> {
        let mut reader = EnvelopeReader::new(Cursor::new(bytes));
        let mut out = Vec::new();
        while let Ok(Some(envelope)) = reader.read_envelope() {
            out.push(Message::try_from(envelope).unwrap());
        }
        out
    }

    fn statuses(messages: &[Message]) -> Vec<ConnectionStatus> {
        messages
            .iter()
            .filter_map(|m| match m {
                Message::Status(s) => Some(s.status),
                _ => None,
            })
            .collect()
    }

    fn read_until_status(
        reader: &mut EnvelopeReader<UnixStream>,
        wanted: ConnectionStatus,
    ) -> Vec<Message> {
        let mut seen = Vec::new();
        loop {
            let envelope = reader.read_envelope().unwrap().unwrap();
            let message = Message::try_from(envelope).unwrap();
            let done = matches!(&message, Message::Status(s) if s.status == wanted);
            seen.push(message);
            if done {
                return seen;
            }
        }
    }

    #[test]
    fn close_releases_everything_and_reports_last() {
        let backend = SimulatedBackend::new().without_auto_connect();
        let input = Cursor::new(wire(&[Message::Close]));
        let out = SharedBuf::default();

        let runtime =
            WorkerRuntime::start(config(), Box::new(backend.clone()), input, out.clone()).unwrap();
        let (reason, _) = runtime.run().unwrap();

        assert_eq!(reason, ExitReason::Closed);
        assert_eq!(
            backend.calls(),
            vec![
                SimulatedCall::Connect,
                SimulatedCall::UnpublishAudio,
                SimulatedCall::UnpublishVideo,
                SimulatedCall::Disconnect,
                SimulatedCall::Release,
            ]
        );
        assert!(backend.is_released());

        let messages = decode_all(out.contents());
        assert_eq!(
            statuses(&messages),
            vec![ConnectionStatus::InitializedSuccess, ConnectionStatus::Disconnected]
        );
        let Some(Message::Status(last)) = messages.last() else {
            panic!("expected a final status, got {messages:?}");
        };
        assert_eq!(last.details, "closed by controller");
        assert_eq!(
            messages[messages.len() - 2],
            Message::log(LogLevel::Info, "worker shutting down")
        );
    }

    #[test]
    fn end_of_input_cleans_up_silently() {
        let backend = SimulatedBackend::new().without_auto_connect();
        let out = SharedBuf::default();
        let runtime = WorkerRuntime::start(
            config(),
            Box::new(backend.clone()),
            Cursor::new(Vec::new()),
            out.clone(),
        )
        .unwrap();

        let (reason, _) = runtime.run().unwrap();

        assert_eq!(reason, ExitReason::InputClosed);
        assert!(backend.calls().contains(&SimulatedCall::Release));
        assert_eq!(
            statuses(&decode_all(out.contents())),
            vec![ConnectionStatus::InitializedSuccess]
        );
    }

    #[test]
    fn truncated_input_is_an_error_after_cleanup() {
        let backend = SimulatedBackend::new().without_auto_connect();
        let mut bytes = wire(&[Message::Close]);
        bytes.truncate(bytes.len() - 1);

        let runtime = WorkerRuntime::start(
            config(),
            Box::new(backend.clone()),
            Cursor::new(bytes),
            SharedBuf::default(),
        )
        .unwrap();

        assert!(matches!(runtime.run(), Err(WorkerError::Protocol(_))));
        assert!(backend.is_released());
    }

    #[test]
    fn setup_failures_name_the_step() {
        for (call, step) in [
            (SimulatedCall::Initialize, "GlobalInitializeFailed"),
            (SimulatedCall::CreateConnection, "NewConnectionFailed"),
            (SimulatedCall::Connect, "ConnectFailed"),
        ] {
            let backend = SimulatedBackend::new().failing(call, -5);
            let out = SharedBuf::default();
            let result = WorkerRuntime::start(
                config(),
                Box::new(backend),
                Cursor::new(Vec::new()),
                out.clone(),
            );

            assert!(matches!(result, Err(WorkerError::Setup { code: RtcCode(-5), .. })));
            let messages = decode_all(out.contents());
            let [Message::Status(status)] = messages.as_slice() else {
                panic!("expected exactly one status, got {messages:?}");
            };
            assert_eq!(status.status, ConnectionStatus::InitializedFailure);
            assert_eq!(status.details, step);
        }
    }

    #[test]
    fn invalid_config_is_reported() {
        let mut cfg = config();
        cfg.video.width = 0;
        let out = SharedBuf::default();
        let result = WorkerRuntime::start(
            cfg,
            Box::new(SimulatedBackend::new()),
            Cursor::new(Vec::new()),
            out.clone(),
        );

        assert!(matches!(result, Err(WorkerError::Config(_))));
        assert_eq!(
            statuses(&decode_all(out.contents())),
            vec![ConnectionStatus::InitializedFailure]
        );
    }

    #[test]
    fn unhandled_and_malformed_messages_are_skipped() {
        let backend = SimulatedBackend::new().without_auto_connect();
        let cfg = config();
        let audio_len = cfg.audio.frame_size();

        let commands = EnvelopeSink::new(Cursor::new(Vec::new()));
        let unknown = Envelope {
            message_type: 42,
            payload_type: 0,
            payload: Default::default(),
        };
        let malformed = Envelope::new(MessageKind::WriteAudioSample, vec![0u8; 3]);
        for envelope in [
            unknown,
            malformed,
            Message::WriteAudioSample(MediaSample::new(vec![0u8; audio_len - 2], 1)).to_envelope(),
            Message::WriteAudioSample(MediaSample::new(vec![0u8; audio_len], 2)).to_envelope(),
            Message::log(LogLevel::Info, "not for the worker").to_envelope(),
            Message::Close.to_envelope(),
        ] {
            commands.write_envelope(&envelope).unwrap();
        }
        let frames = commands.close().unwrap().into_inner();

        let out = SharedBuf::default();
        let runtime = WorkerRuntime::start(
            cfg,
            Box::new(backend.clone()),
            Cursor::new(frames),
            out.clone(),
        )
        .unwrap();
        let (reason, stats) = runtime.run().unwrap();

        assert_eq!(reason, ExitReason::Closed);
        assert_eq!(stats.audio_frames, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(backend.audio_frames(), 1);

        let messages = decode_all(out.contents());
        let failures: Vec<_> = messages
            .iter()
            .filter_map(|m| match m {
                Message::Status(s) if s.status == ConnectionStatus::Failed => Some(s.message.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            failures,
            vec![
                "unknown command type received: 42".to_string(),
                "unknown command type received: LOG_RESPONSE".to_string(),
            ]
        );
        assert!(messages.iter().any(
            |m| matches!(m, Message::Log(log) if log.message.starts_with("malformed message"))
        ));
        assert_eq!(
            statuses(&messages).last(),
            Some(&ConnectionStatus::Disconnected)
        );
    }

    #[test]
    fn envelope_shorter_than_header_is_skipped() {
        let backend = SimulatedBackend::new().without_auto_connect();
        let mut frames = vec![0, 0, 0, 1, 42];
        frames.extend(wire(&[Message::Close]));

        let out = SharedBuf::default();
        let runtime = WorkerRuntime::start(
            config(),
            Box::new(backend.clone()),
            Cursor::new(frames),
            out.clone(),
        )
        .unwrap();
        let (reason, _) = runtime.run().unwrap();

        assert_eq!(reason, ExitReason::Closed);
        assert!(backend.is_released());
        let messages = decode_all(out.contents());
        assert!(messages.iter().any(|m| matches!(
            m,
            Message::Log(log) if log.level == LogLevel::Error
                && log.message.starts_with("malformed message")
        )));
        assert_eq!(
            statuses(&messages).last(),
            Some(&ConnectionStatus::Disconnected)
        );
    }

    #[test]
    fn wrong_sized_samples_are_counted_not_fatal() {
        let backend = SimulatedBackend::new().without_auto_connect();
        let cfg = config();
        let video_len = cfg.video.frame_size();
        let mut messages: Vec<_> = (0..5)
            .map(|ts| Message::WriteVideoSample(MediaSample::new(vec![0u8; video_len + 1], ts)))
            .collect();
        messages.push(Message::WriteVideoSample(MediaSample::new(vec![0u8; video_len], 5)));
        messages.push(Message::Close);

        let runtime = WorkerRuntime::start(
            cfg,
            Box::new(backend.clone()),
            Cursor::new(wire(&messages)),
            SharedBuf::default(),
        )
        .unwrap();
        let (reason, stats) = runtime.run().unwrap();

        assert_eq!(reason, ExitReason::Closed);
        assert_eq!(stats.rejected, 5);
        assert_eq!(stats.video_frames, 1);
        assert_eq!(backend.video_frames(), 1);
    }

    #[test]
    fn rejection_warnings_are_spaced_out() {
        let reported: Vec<u64> = (1..=3 * REJECT_WARN_INTERVAL)
            .filter(|&n| reports_rejection(n))
            .collect();
        assert_eq!(
            reported,
            vec![
                1,
                REJECT_WARN_INTERVAL,
                2 * REJECT_WARN_INTERVAL,
                3 * REJECT_WARN_INTERVAL
            ]
        );
    }

    #[test]
    fn full_session_over_sockets() {
        let backend = SimulatedBackend::new().with_connect_delay(Duration::from_millis(10));
        let (controller_in, worker_in) = UnixStream::pair().unwrap();
        let (worker_out, controller_out) = UnixStream::pair().unwrap();
        let cfg = config();
        let video_len = cfg.video.frame_size();
        let audio_len = cfg.audio.frame_size();

        let worker = {
            let backend = backend.clone();
            thread::spawn(move || {
                WorkerRuntime::start(cfg, Box::new(backend), worker_in, worker_out)
                    .unwrap()
                    .run()
                    .unwrap()
            })
        };

        let mut events = EnvelopeReader::new(controller_out);
        let before = read_until_status(&mut events, ConnectionStatus::Connected);
        assert_eq!(
            statuses(&before),
            vec![
                ConnectionStatus::InitializedSuccess,
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
            ]
        );

        let commands = EnvelopeSink::new(controller_in);
        for n in 0..3 {
            commands
                .send(&Message::WriteVideoSample(MediaSample::new(vec![1u8; video_len], n)))
                .unwrap();
            commands
                .send(&Message::WriteAudioSample(MediaSample::new(vec![2u8; audio_len], n)))
                .unwrap();
        }
        commands.send_empty().unwrap();
        assert!(backend.inject(ConnectionEvent::UserJoined { user_id: "7".into() }));
        commands.send(&Message::Close).unwrap();

        let after = read_until_status(&mut events, ConnectionStatus::Disconnected);
        assert!(after
            .iter()
            .any(|m| matches!(m, Message::Log(log) if log.message == "worker shutting down")));

        let (reason, stats) = worker.join().unwrap();
        assert_eq!(reason, ExitReason::Closed);
        assert_eq!((stats.video_frames, stats.audio_frames), (3, 3));
        assert_eq!(backend.video_frames(), 3);
        assert!(backend.calls().contains(&SimulatedCall::PublishVideo));
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<std::sync::Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
