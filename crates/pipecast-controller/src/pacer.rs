//! Fixed-interval frame pacing.

use std::io::{Read, Seek};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use pipecast_protocol::{MediaKind, MediaSample, ProtocolError};
use serde::Serialize;

use crate::error::{ControllerError, Result};
use crate::sender::MediaSink;
use crate::source::LoopingSource;
use crate::state::ConnectionState;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Cooperative stop flag shared by pacers and the shutdown path.
///
/// Waiting on it is interruptible: raising it wakes every waiter at once.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        *self.lock() = true;
        self.inner.1.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        *self.lock()
    }

    /// Sleep until `deadline`. Returns true if the signal was raised first.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let timeout = deadline.saturating_duration_since(Instant::now());
        self.wait_timeout(timeout)
    }

    /// Sleep for up to `timeout`. Returns true if the signal was raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (raised, _) = self
            .inner
            .1
            .wait_timeout_while(guard, timeout, |raised| !*raised)
            .unwrap_or_else(PoisonError::into_inner);
        *raised
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Sent,
    /// No live connection; the tick was dropped without reading.
    Disconnected,
    /// The source could not fill a frame and went back to its start.
    Rewound,
    /// The worker refused the write; the frame is lost.
    SendFailed,
}

/// Counters for one pacer, reported in the session summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PacerStats {
    pub kind: MediaKind,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub skipped_disconnected: u64,
    pub rewinds: u64,
    pub send_failures: u64,
    /// Ticks dropped because the loop fell behind its schedule.
    pub late_ticks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PacerStats {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            frames_sent: 0,
            bytes_sent: 0,
            skipped_disconnected: 0,
            rewinds: 0,
            send_failures: 0,
            late_ticks: 0,
            error: None,
        }
    }
}

/// Sends one fixed-size frame from a looping source per interval.
pub struct Pacer<R> {
    kind: MediaKind,
    source: LoopingSource<R>,
    interval: Duration,
    sink: Arc<dyn MediaSink>,
    state: ConnectionState,
    stats: PacerStats,
}

impl<R: Read + Seek> Pacer<R> {
    pub fn new(
        kind: MediaKind,
        source: LoopingSource<R>,
        interval: Duration,
        sink: Arc<dyn MediaSink>,
        state: ConnectionState,
    ) -> Self {
        Self {
            kind,
            source,
            interval: interval.max(MIN_INTERVAL),
            sink,
            state,
            stats: PacerStats::new(kind),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn stats(&self) -> &PacerStats {
        &self.stats
    }

    /// Run one tick. `elapsed` is time since the pacer started and becomes
    /// the frame's timestamp.
    ///
    /// Errors mean this pacer cannot continue: the source failed to read, or
    /// the worker's input is gone.
    pub fn tick(&mut self, elapsed: Duration) -> Result<Tick> {
        if !self.state.is_connected() {
            self.stats.skipped_disconnected += 1;
            return Ok(Tick::Disconnected);
        }

        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.stats.rewinds += 1;
                return Ok(Tick::Rewound);
            }
            Err(source) => {
                return Err(ControllerError::Read {
                    kind: self.kind,
                    source,
                })
            }
        };

        let len = frame.len() as u64;
        let timestamp = i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX);
        match self.sink.send_sample(self.kind, MediaSample::new(frame, timestamp)) {
            Ok(()) => {
                self.stats.frames_sent += 1;
                self.stats.bytes_sent += len;
                Ok(Tick::Sent)
            }
            Err(err) if err.is_broken_pipe() || matches!(err, ProtocolError::SinkClosed) => {
                Err(err.into())
            }
            Err(err) => {
                self.stats.send_failures += 1;
                tracing::warn!(kind = %self.kind, error = %err, "frame send failed");
                Ok(Tick::SendFailed)
            }
        }
    }

    /// Tick at the configured interval until `stop` is raised or a tick fails.
    pub fn run(mut self, stop: &StopSignal) -> PacerStats {
        let started = Instant::now();
        let mut next = started + self.interval;
        let mut last_report = started;
        tracing::info!(
            kind = %self.kind,
            interval_ms = self.interval.as_secs_f64() * 1000.0,
            frame_size = self.source.frame_size(),
            "pacer started"
        );

        loop {
            if stop.wait_until(next) {
                break;
            }
            if let Err(err) = self.tick(started.elapsed()) {
                tracing::error!(kind = %self.kind, error = %err, "pacer stopped");
                self.stats.error = Some(err.to_string());
                break;
            }

            next += self.interval;
            let now = Instant::now();
            if next <= now {
                let behind = now.duration_since(next).as_nanos() / self.interval.as_nanos() + 1;
                self.stats.late_ticks += behind as u64;
                next += self.interval * behind as u32;
            }
            if now.duration_since(last_report) >= PROGRESS_INTERVAL {
                tracing::info!(
                    kind = %self.kind,
                    frames_sent = self.stats.frames_sent,
                    skipped = self.stats.skipped_disconnected,
                    rewinds = self.stats.rewinds,
                    "pacer progress"
                );
                last_report = now;
            }
        }

        tracing::info!(
            kind = %self.kind,
            frames_sent = self.stats.frames_sent,
            late_ticks = self.stats.late_ticks,
            "pacer finished"
        );
        self.stats
    }
}

/// A pacer running on its own thread.
pub struct PacerHandle {
    kind: MediaKind,
    handle: JoinHandle<PacerStats>,
}

impl PacerHandle {
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Wait for the pacer to finish its current tick and exit.
    pub fn join(self) -> PacerStats {
        self.handle.join().unwrap_or_else(|_| {
            let mut stats = PacerStats::new(self.kind);
            stats.error = Some("pacer thread panicked".to_string());
            stats
        })
    }
}

pub fn spawn_pacer<R>(pacer: Pacer<R>, stop: StopSignal) -> Result<PacerHandle>
where
    R: Read + Seek + Send + 'static,
{
    let kind = pacer.kind();
    let handle = thread::Builder::new()
        .name(format!("pipecast-{kind}-pacer"))
        .spawn(move || pacer.run(&stop))
        .map_err(|source| ControllerError::Thread {
            name: "pacer",
            source,
        })?;
    Ok(PacerHandle { kind, handle })
}
