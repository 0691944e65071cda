//! Ordered teardown of a controller session.
//!
//! ```text
//! raise stop -> join pacers -> begin_close -> send Close
//!   -> wait close_grace -> close worker stdin -> wait rest of exit_timeout
//!   -> kill if still running -> join readers
//! ```
//!
//! Pacers are joined before Close is written, so no frame can follow it.

use std::process::ExitStatus;
use std::time::Duration;

use serde::Serialize;

use crate::controller::Controller;
use crate::pacer::{PacerHandle, PacerStats, StopSignal};
use crate::sender::MediaSink;
use crate::state::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownConfig {
    /// How long the worker gets to exit after Close, before its input is closed.
    pub close_grace: Duration,
    /// Total time the worker gets to exit before it is killed.
    pub exit_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            close_grace: Duration::from_secs(1),
            exit_timeout: Duration::from_secs(5),
        }
    }
}

/// How the worker process ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    /// The controller had to force-terminate it.
    pub killed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerExit {
    fn from_status(status: ExitStatus, killed: bool) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
            killed,
            error: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0) && !self.killed
    }
}

/// Session summary returned by [`Controller::shutdown`].
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    pub pacers: Vec<PacerStats>,
    pub close_sent: bool,
    pub worker: WorkerExit,
}

/// Stop and join every pacer, then send Close.
///
/// Returns the pacer statistics and whether Close was written.
pub fn stop_and_close(
    stop: &StopSignal,
    pacers: Vec<PacerHandle>,
    state: &ConnectionState,
    sink: &dyn MediaSink,
) -> (Vec<PacerStats>, bool) {
    stop.raise();
    let stats = pacers.into_iter().map(PacerHandle::join).collect();
    state.begin_close();

    let close_sent = match sink.send_close() {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "could not send close to worker");
            false
        }
    };
    (stats, close_sent)
}

impl Controller {
    /// Tear the session down. Always reaps the worker and joins both readers.
    pub fn shutdown(
        mut self,
        stop: &StopSignal,
        pacers: Vec<PacerHandle>,
        config: ShutdownConfig,
    ) -> ShutdownReport {
        tracing::info!(pid = self.process.id(), "shutting down");
        let (pacers, close_sent) = stop_and_close(stop, pacers, &self.state, &self.sender);
        let worker = self.reap(close_sent, config);
        self.join_readers();

        tracing::info!(
            code = worker.code,
            killed = worker.killed,
            close_sent,
            "worker stopped"
        );
        ShutdownReport {
            pacers,
            close_sent,
            worker,
        }
    }

    fn reap(&mut self, close_sent: bool, config: ShutdownConfig) -> WorkerExit {
        let mut status = None;
        if close_sent {
            status = self.wait_exit(config.close_grace);
        }

        // Closing stdin is the second stop request: the worker sees EOF.
        self.sender.close();
        if status.is_none() {
            status = self.wait_exit(config.exit_timeout.saturating_sub(config.close_grace));
        }
        self.reaped = true;

        if let Some(status) = status {
            return WorkerExit::from_status(status, false);
        }

        tracing::warn!(pid = self.process.id(), "worker did not exit, killing it");
        match self.process.kill() {
            Ok(status) => WorkerExit::from_status(status, true),
            Err(err) => WorkerExit {
                killed: true,
                error: Some(err.to_string()),
                ..WorkerExit::default()
            },
        }
    }

    fn wait_exit(&mut self, timeout: Duration) -> Option<ExitStatus> {
        match self.process.wait_timeout(timeout) {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(error = %err, "waiting for worker failed");
                None
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Instant;

    use pipecast_protocol::{
        ConnectionStatus, MediaKind, MediaSample, ProtocolError, SessionConfig,
    };

    use super::*;
    use crate::controller::WorkerCommand;
    use crate::error::ControllerError;
    use crate::pacer::{spawn_pacer, Pacer};
    use crate::source::LoopingSource;

    /// Length-prefixed `StatusResponse(connected)` with empty strings.
    const CONNECTED_FRAME: &str = r"\000\000\000\013\004\002\002\000\000\000\000\000\000\000\000";

    fn fake_worker(script: &str) -> WorkerCommand {
        WorkerCommand::new("sh")
            .arg("-c")
            .arg(script)
            .arg("fake-worker")
    }

    fn session() -> SessionConfig {
        SessionConfig::new("app", "room")
    }

    fn quick() -> ShutdownConfig {
        ShutdownConfig {
            close_grace: Duration::from_millis(100),
            exit_timeout: Duration::from_millis(400),
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Sent {
        Sample(MediaKind),
        Close,
    }

    #[derive(Default)]
    struct RecordingSink {
        log: Mutex<Vec<Sent>>,
    }

    impl MediaSink for RecordingSink {
        fn send_sample(&self, kind: MediaKind, _sample: MediaSample) -> Result<(), ProtocolError> {
            self.log.lock().unwrap().push(Sent::Sample(kind));
            Ok(())
        }

        fn send_close(&self) -> Result<(), ProtocolError> {
            self.log.lock().unwrap().push(Sent::Close);
            Ok(())
        }
    }

    #[test]
    fn close_is_the_last_thing_sent() {
        let sink = Arc::new(RecordingSink::default());
        let state = ConnectionState::new();
        state.apply(ConnectionStatus::Connected);
        let stop = StopSignal::new();

        let pacers = [(MediaKind::Audio, 2), (MediaKind::Video, 5)]
            .into_iter()
            .map(|(kind, ms)| {
                let source = LoopingSource::new(Cursor::new(vec![0u8; 64]), 8);
                let pacer = Pacer::new(
                    kind,
                    source,
                    Duration::from_millis(ms),
                    Arc::clone(&sink) as Arc<dyn MediaSink>,
                    state.clone(),
                );
                spawn_pacer(pacer, stop.clone()).unwrap()
            })
            .collect();

        thread::sleep(Duration::from_millis(60));
        let (stats, close_sent) = stop_and_close(&stop, pacers, &state, sink.as_ref());

        assert!(close_sent);
        assert!(!state.is_connected());
        assert_eq!(stats.len(), 2);
        let log = sink.log.lock().unwrap().clone();
        assert_eq!(log.last(), Some(&Sent::Close));
        assert_eq!(log.iter().filter(|s| **s == Sent::Close).count(), 1);
        let frames: u64 = stats.iter().map(|s| s.frames_sent).sum();
        assert_eq!(frames as usize, log.len() - 1);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(sink.log.lock().unwrap().len(), log.len());
    }

    #[test]
    fn silent_worker_times_out_then_exits_on_eof() {
        let controller = Controller::spawn(fake_worker("cat >/dev/null"), session()).unwrap();

        let err = controller
            .wait_until_connected(Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, ControllerError::ConnectTimeout(_)));

        let report = controller.shutdown(&StopSignal::new(), Vec::new(), quick());
        assert!(report.close_sent);
        assert!(report.worker.success(), "{:?}", report.worker);
    }

    #[test]
    fn stubborn_worker_is_killed() {
        let controller = Controller::spawn(fake_worker("exec sleep 30"), session()).unwrap();

        let started = Instant::now();
        let report = controller.shutdown(&StopSignal::new(), Vec::new(), quick());

        assert!(report.worker.killed);
        assert!(!report.worker.success());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn early_exit_fails_the_wait() {
        let controller = Controller::spawn(fake_worker("exit 0"), session()).unwrap();
        let err = controller
            .wait_until_connected(Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, ControllerError::WorkerExited));
        controller.shutdown(&StopSignal::new(), Vec::new(), quick());
    }

    #[test]
    fn paced_session_against_connected_worker() {
        let script = format!("printf '{CONNECTED_FRAME}'; echo ready >&2; cat >/dev/null");
        let controller = Controller::spawn(fake_worker(&script), session()).unwrap();
        controller
            .wait_until_connected(Duration::from_secs(5))
            .unwrap();
        assert!(controller.is_connected());

        let audio_len = controller.config().frame_size(MediaKind::Audio);
        let source = LoopingSource::new(Cursor::new(vec![7u8; audio_len * 10]), audio_len);
        let stop = StopSignal::new();
        let pacer = spawn_pacer(controller.pacer(MediaKind::Audio, source), stop.clone()).unwrap();

        thread::sleep(Duration::from_millis(150));
        let report = controller.shutdown(&stop, vec![pacer], quick());

        assert!(report.close_sent);
        assert_eq!(report.pacers.len(), 1);
        assert!(report.pacers[0].frames_sent > 0);
        assert_eq!(report.pacers[0].error, None);
        assert!(report.worker.success(), "{:?}", report.worker);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["pacers"][0]["kind"], "audio");
        assert_eq!(json["worker"]["code"], 0);
    }

    #[test]
    fn short_frame_from_worker_does_not_end_event_stream() {
        let script =
            format!(r"printf '\000\000\000\001\052{CONNECTED_FRAME}'; cat >/dev/null");
        let controller = Controller::spawn(fake_worker(&script), session()).unwrap();

        controller
            .wait_until_connected(Duration::from_secs(5))
            .unwrap();
        assert!(controller.is_connected());
        assert!(!controller.state().is_worker_gone());

        let report = controller.shutdown(&StopSignal::new(), Vec::new(), quick());
        assert!(report.close_sent);
    }

    #[test]
    fn invalid_config_never_spawns() {
        let mut config = session();
        config.audio.sample_rate = 44_101;
        let err = Controller::spawn(fake_worker("exit 0"), config).err().unwrap();
        assert!(matches!(err, ControllerError::Protocol(_)));
    }
}
